use std::sync::Arc;

use bhp_proxy::{HostProxy, ProxyConfig};
use bhp_transport::{Destination, StreamTransport};
use serde::Serialize;

use crate::cmd::{apply_timeout, PackagesArgs};
use crate::exit::{proxy_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct PackagesOutput {
    destination: &'static str,
    applets: Vec<String>,
}

pub fn run(args: PackagesArgs, format: OutputFormat, mut config: ProxyConfig) -> CliResult<i32> {
    apply_timeout(&mut config, args.timeout.as_deref())?;

    let transport = Arc::new(
        StreamTransport::connect(&[(Destination::Ivm, &args.ivm)])
            .map_err(|err| transport_error("connect failed", err))?,
    );
    let proxy = HostProxy::with_config(transport.clone(), config);
    let receivers = transport
        .start_receivers(proxy.inbound())
        .map_err(|err| transport_error("start receivers", err))?;

    let listed = proxy.list_packages(Destination::Ivm);
    transport.shutdown();
    for receiver in receivers {
        let _ = receiver.join();
    }
    let applets = listed.map_err(|err| proxy_error("list packages", err))?;

    let out = PackagesOutput {
        destination: Destination::Ivm.name(),
        applets: applets.iter().map(ToString::to_string).collect(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = comfy_table::Table::new();
            table
                .load_preset(comfy_table::presets::UTF8_FULL)
                .set_header(vec!["#", "APPLET"]);
            for (index, applet) in out.applets.iter().enumerate() {
                table.add_row(vec![index.to_string(), applet.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            let mut text = out.applets.join("\n");
            text.push('\n');
            print_raw(text.as_bytes())?;
        }
    }
    Ok(SUCCESS)
}
