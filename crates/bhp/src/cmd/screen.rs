use bhp_proxy::{
    AppletDenyList, AppletIdResolver, CommandAllowList, FilterChain, MaxFrameLength, Screening,
    UuidResolver,
};
use serde::Serialize;

use crate::cmd::{read_file, ScreenArgs};
use crate::exit::{proxy_error, wire_error, CliResult, PERMISSION_DENIED, SUCCESS};
use crate::output::{print_fields, print_json, print_pretty, print_raw, OutputFormat};

#[derive(Serialize)]
struct ScreenOutput {
    seq: u64,
    command: &'static str,
    accepted: bool,
    verdict: i32,
    filters: usize,
}

pub fn run(args: ScreenArgs, format: OutputFormat) -> CliResult<i32> {
    let chain = build_chain(&args)?;
    let frame = read_file(&args.path)?;
    let header =
        bhp_wire::command_header(&frame).map_err(|err| wire_error("not a command frame", err))?;
    let screening = chain
        .screen(&frame, &())
        .map_err(|err| wire_error("screen failed", err))?;

    let (verdict, code) = match &screening {
        Screening::Forward(_) => (0, SUCCESS),
        Screening::Deny { verdict, .. } => (*verdict, PERMISSION_DENIED),
    };
    tracing::info!(seq = header.seq, verdict, "command screened");

    let out = ScreenOutput {
        seq: header.seq,
        command: header.id.name(),
        accepted: code == SUCCESS,
        verdict,
        filters: chain.len(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let fields = [
                ("seq", out.seq.to_string()),
                ("command", out.command.to_string()),
                ("accepted", out.accepted.to_string()),
                ("verdict", out.verdict.to_string()),
                ("filters", out.filters.to_string()),
            ];
            if format == OutputFormat::Table {
                print_fields(&fields);
            } else {
                print_pretty(&fields);
            }
        }
        OutputFormat::Raw => match &screening {
            Screening::Forward(_) => print_raw(&frame)?,
            Screening::Deny { response, .. } => print_raw(response)?,
        },
    }
    Ok(code)
}

fn build_chain(args: &ScreenArgs) -> CliResult<FilterChain> {
    let mut chain = FilterChain::new();
    if let Some(max) = args.max_length {
        chain.push(MaxFrameLength(max));
    }
    if let Some(allowed) = &args.allow_commands {
        chain.push(CommandAllowList::new(allowed.iter().copied()));
    }
    if !args.deny_applet.is_empty() {
        let denied = args
            .deny_applet
            .iter()
            .map(|text| UuidResolver.resolve(text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| proxy_error("--deny-applet", err))?;
        chain.push(AppletDenyList::new(denied));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bhp_wire::CommandId;

    use super::*;
    use crate::exit::USAGE;

    fn args() -> ScreenArgs {
        ScreenArgs {
            path: PathBuf::from("frame.bin"),
            allow_commands: None,
            deny_applet: Vec::new(),
            max_length: None,
        }
    }

    #[test]
    fn chain_has_one_filter_per_option() {
        assert!(build_chain(&args()).unwrap().is_empty());

        let args = ScreenArgs {
            allow_commands: Some(vec![CommandId::ListPackages]),
            deny_applet: vec!["3c4724a3b9b64a4ba3f895cd8a2a0a86".to_string()],
            max_length: Some(4096),
            ..args()
        };
        assert_eq!(build_chain(&args).unwrap().len(), 3);
    }

    #[test]
    fn bad_applet_id_is_a_usage_error() {
        let args = ScreenArgs {
            deny_applet: vec!["not-a-uuid".to_string()],
            ..args()
        };
        assert_eq!(build_chain(&args).unwrap_err().code, USAGE);
    }
}
