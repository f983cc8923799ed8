use bhp_wire::{code, decode_message, open_session_applet_id, Message, DEFAULT_MAX_FRAME};
use bytes::BytesMut;
use serde::Serialize;

use crate::cmd::{read_file, InspectArgs};
use crate::exit::{wire_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{hex, print_fields, print_json, print_pretty, print_raw, OutputFormat};

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "direction", rename_all = "snake_case")]
enum FrameInfo {
    Command {
        length: u32,
        seq: u64,
        command_id: u32,
        command: &'static str,
        body_len: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        applet: Option<String>,
    },
    Response {
        length: u32,
        seq: u64,
        addr: u64,
        code: i32,
        status: &'static str,
        body_len: usize,
    },
}

impl FrameInfo {
    fn from_message(message: &Message) -> Self {
        let body_len = message.body().len();
        match message {
            Message::Command { header, frame } => FrameInfo::Command {
                length: header.length,
                seq: header.seq,
                command_id: header.id.into(),
                command: header.id.name(),
                body_len,
                applet: header
                    .is_open_session()
                    .then(|| open_session_applet_id(header, frame).ok())
                    .flatten()
                    .map(|id| id.to_string()),
            },
            Message::Response { header, .. } => FrameInfo::Response {
                length: header.length,
                seq: header.seq,
                addr: header.addr,
                code: header.code,
                status: code::describe(header.code),
                body_len,
            },
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            FrameInfo::Command {
                length,
                seq,
                command_id,
                command,
                body_len,
                applet,
            } => {
                let mut fields = vec![
                    ("direction", "command".to_string()),
                    ("length", length.to_string()),
                    ("seq", seq.to_string()),
                    ("command", format!("{command} ({command_id})")),
                    ("body_len", body_len.to_string()),
                ];
                if let Some(applet) = applet {
                    fields.push(("applet", applet.clone()));
                }
                fields
            }
            FrameInfo::Response {
                length,
                seq,
                addr,
                code,
                status,
                body_len,
            } => vec![
                ("direction", "response".to_string()),
                ("length", length.to_string()),
                ("seq", seq.to_string()),
                ("addr", format!("0x{addr:x}")),
                ("code", format!("{status} (0x{code:x})")),
                ("body_len", body_len.to_string()),
            ],
        }
    }
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = read_file(&args.path)?;
    let mut buf = BytesMut::from(&raw[..]);
    let message = decode_message(&mut buf, DEFAULT_MAX_FRAME)
        .map_err(|err| wire_error("decode failed", err))?
        .ok_or_else(|| {
            CliError::new(
                DATA_INVALID,
                format!("incomplete frame ({} bytes)", raw.len()),
            )
        })?;
    if !buf.is_empty() {
        tracing::warn!(trailing = buf.len(), "bytes after the first frame ignored");
    }

    let info = FrameInfo::from_message(&message);
    match format {
        OutputFormat::Json => print_json(&info),
        OutputFormat::Table => print_fields(&info.fields()),
        OutputFormat::Pretty => print_pretty(&info.fields()),
        OutputFormat::Raw => {
            let mut line = hex(&message.body());
            line.push('\n');
            print_raw(line.as_bytes())?;
        }
    }
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use bhp_wire::{encode_command, encode_response, AppletId, Command};

    use super::*;

    fn decode(mut frame: BytesMut) -> Message {
        decode_message(&mut frame, DEFAULT_MAX_FRAME)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn open_session_frames_show_the_applet() {
        let applet = AppletId::from_bytes([0x11; 16]);
        let mut frame = BytesMut::new();
        encode_command(9, &Command::open_session(applet), b"init", &mut frame).unwrap();

        let info = FrameInfo::from_message(&decode(frame));
        assert_eq!(
            info,
            FrameInfo::Command {
                length: 44,
                seq: 9,
                command_id: 4,
                command: "open-session",
                body_len: 20,
                applet: Some(applet.to_string()),
            }
        );
    }

    #[test]
    fn response_fields_name_the_status() {
        let mut frame = BytesMut::new();
        encode_response(3, 0x1000, code::WD_TIMEOUT, &[], &mut frame).unwrap();

        let info = FrameInfo::from_message(&decode(frame));
        let fields = info.fields();
        assert!(fields.contains(&("addr", "0x1000".to_string())));
        assert!(fields.contains(&("code", "WD_TIMEOUT (0x3003)".to_string())));
    }
}
