use std::sync::Arc;
use std::thread::JoinHandle;

use bhp_proxy::{CloseOutcome, HostProxy, ProxyConfig, SendReply};
use bhp_transport::{Destination, StreamTransport};
use serde::Serialize;

use crate::cmd::{apply_timeout, read_file, SessionArgs};
use crate::exit::{proxy_error, transport_error, CliResult, SUCCESS};
use crate::output::{
    payload_preview, print_fields, print_json, print_pretty, print_raw, OutputFormat,
};

#[derive(Serialize)]
struct SessionOutput {
    handle: u64,
    response_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    output_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<usize>,
    close: &'static str,
}

/// Connected links plus the threads reading from them.
struct Link {
    transport: Arc<StreamTransport>,
    receivers: Vec<JoinHandle<()>>,
}

impl Link {
    fn shutdown(self) {
        self.transport.shutdown();
        for receiver in self.receivers {
            if receiver.join().is_err() {
                tracing::warn!("response reader panicked");
            }
        }
    }
}

pub fn run(args: SessionArgs, format: OutputFormat, mut config: ProxyConfig) -> CliResult<i32> {
    apply_timeout(&mut config, args.timeout.as_deref())?;
    // Without an SVM link there is nobody to ask about blocked applets.
    if args.svm.is_none() {
        config.check_blocked_state = false;
    }

    let package = read_file(&args.package)?;
    let input = match (&args.data, &args.file) {
        (Some(data), _) => data.as_bytes().to_vec(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => Vec::new(),
    };

    let mut endpoints = vec![(Destination::Ivm, args.ivm.clone())];
    if let Some(svm) = &args.svm {
        endpoints.push((Destination::Svm, svm.clone()));
    }
    let transport = Arc::new(
        StreamTransport::connect(&endpoints)
            .map_err(|err| transport_error("connect failed", err))?,
    );
    let proxy = HostProxy::with_config(transport.clone(), config);
    let receivers = transport
        .start_receivers(proxy.inbound())
        .map_err(|err| transport_error("start receivers", err))?;
    let link = Link {
        transport,
        receivers,
    };

    let result = exchange(&proxy, &args, &package, &input);
    link.shutdown();
    let (out, output) = result?;

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut fields = vec![
                ("handle", out.handle.to_string()),
                ("response_code", out.response_code.to_string()),
                ("output_len", out.output_len.to_string()),
            ];
            if let Some(preview) = &out.output {
                fields.push(("output", preview.clone()));
            }
            if let Some(required) = out.required {
                fields.push(("required", required.to_string()));
            }
            fields.push(("close", out.close.to_string()));
            if format == OutputFormat::Table {
                print_fields(&fields);
            } else {
                print_pretty(&fields);
            }
        }
        OutputFormat::Raw => print_raw(&output)?,
    }
    Ok(SUCCESS)
}

fn exchange(
    proxy: &HostProxy,
    args: &SessionArgs,
    package: &[u8],
    input: &[u8],
) -> CliResult<(SessionOutput, bytes::Bytes)> {
    let init = args.init.as_deref().unwrap_or_default().as_bytes();
    let handle = proxy
        .open_session(&args.applet, init, package)
        .map_err(|err| proxy_error("open session", err))?;

    let reply = proxy.send_and_receive(handle, args.command, input, args.capacity);
    // The session is closed even when the send failed.
    let closed = proxy.close_session(handle);
    let reply = reply.map_err(|err| proxy_error("send", err))?;
    let close = match closed.map_err(|err| proxy_error("close session", err))? {
        CloseOutcome::Closed => "closed",
        CloseOutcome::InternalSessionPending => "internal-session-pending",
    };

    let response_code = reply.response_code();
    let (output, required) = match reply {
        SendReply::Complete { output, .. } => (output, None),
        SendReply::BufferTooSmall { required, .. } => (bytes::Bytes::new(), Some(required)),
    };
    let out = SessionOutput {
        handle: handle.as_u64(),
        response_code,
        output: required.is_none().then(|| payload_preview(&output)),
        output_len: output.len(),
        required,
        close,
    };
    Ok((out, output))
}
