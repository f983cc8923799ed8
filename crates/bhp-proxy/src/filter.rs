//! Inbound filter chain.
//!
//! Commands arriving from an untrusted caller are screened before they are
//! forwarded to the VM. Each filter looks at the parsed header and the raw
//! frame and either accepts or rejects with a negative errno-style code.
//! The first rejection stops the chain. Rejected commands are answered with
//! a well-formed response carrying `OPERATION_NOT_PERMITTED`.

use std::collections::HashSet;
use std::fmt;

use bhp_wire::{
    code, command_header, encode_response, open_session_applet_id, AppletId, CommandHeader,
    CommandId, WireError,
};
use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Rejection code for a command the policy does not allow.
pub const REJECT_NOT_PERMITTED: i32 = -1;
/// Rejection code for a command whose frame is unacceptable.
pub const REJECT_INVALID: i32 = -22;

/// Outcome of one filter, or of a whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Negative code reported to whoever runs the chain.
    Reject(i32),
}

impl Verdict {
    /// Integer form: 0 for accept, the negative code otherwise.
    pub fn as_code(self) -> i32 {
        match self {
            Self::Accept => 0,
            Self::Reject(code) => code,
        }
    }

    pub fn is_accept(self) -> bool {
        self == Self::Accept
    }
}

/// One predicate over an inbound command.
///
/// `frame` is the complete command frame; its length is the frame length
/// the chain was given. `ctx` is caller-defined state such as the identity
/// of the client that sent the command.
pub trait HeaderFilter<C: ?Sized>: Send + Sync {
    fn evaluate(&self, header: &CommandHeader, frame: &[u8], ctx: &C) -> Verdict;
}

impl<C, F> HeaderFilter<C> for F
where
    C: ?Sized,
    F: Fn(&CommandHeader, &[u8], &C) -> Verdict + Send + Sync,
{
    fn evaluate(&self, header: &CommandHeader, frame: &[u8], ctx: &C) -> Verdict {
        self(header, frame, ctx)
    }
}

/// Ordered list of filters.
pub struct FilterChain<C: ?Sized = ()> {
    filters: Vec<Box<dyn HeaderFilter<C>>>,
}

impl<C: ?Sized> Default for FilterChain<C> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for FilterChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// What to do with a screened command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    /// Accepted; forward it.
    Forward(CommandHeader),
    /// Rejected; send `response` back instead.
    Deny { verdict: i32, response: Bytes },
}

impl<C: ?Sized> FilterChain<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; builder form.
    pub fn with(mut self, filter: impl HeaderFilter<C> + 'static) -> Self {
        self.push(filter);
        self
    }

    pub fn push(&mut self, filter: impl HeaderFilter<C> + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Apply every filter in order; the first rejection is the result.
    pub fn run(&self, header: &CommandHeader, frame: &[u8], ctx: &C) -> Verdict {
        for (index, filter) in self.filters.iter().enumerate() {
            let verdict = filter.evaluate(header, frame, ctx);
            if let Verdict::Reject(code) = verdict {
                debug!(index, seq = header.seq, code, "command rejected by filter");
                return verdict;
            }
        }
        Verdict::Accept
    }

    /// Parse, run the chain, and build the denial frame when rejected.
    ///
    /// Input that is not a command frame is an error, not a denial.
    pub fn screen(&self, frame: &[u8], ctx: &C) -> Result<Screening, WireError> {
        let header = command_header(frame)?;
        match self.run(&header, frame, ctx) {
            Verdict::Accept => Ok(Screening::Forward(header)),
            Verdict::Reject(verdict) => Ok(Screening::Deny {
                verdict,
                response: deny(frame)?,
            }),
        }
    }
}

/// Build the rejection response for a command frame: same sequence,
/// `OPERATION_NOT_PERMITTED`, no body.
pub fn deny(raw_command: &[u8]) -> Result<Bytes, WireError> {
    let header = command_header(raw_command)?;
    let mut buf = BytesMut::new();
    encode_response(header.seq, 0, code::OPERATION_NOT_PERMITTED, &[], &mut buf)?;
    Ok(buf.freeze())
}

/// Rejects commands whose id is not in the list.
#[derive(Debug, Clone)]
pub struct CommandAllowList {
    allowed: HashSet<CommandId>,
}

impl CommandAllowList {
    pub fn new(allowed: impl IntoIterator<Item = CommandId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl<C: ?Sized> HeaderFilter<C> for CommandAllowList {
    fn evaluate(&self, header: &CommandHeader, _frame: &[u8], _ctx: &C) -> Verdict {
        if self.allowed.contains(&header.id) {
            Verdict::Accept
        } else {
            Verdict::Reject(REJECT_NOT_PERMITTED)
        }
    }
}

/// Rejects opening sessions with the listed applets. Open-session frames
/// too short to carry an applet id are rejected as invalid.
#[derive(Debug, Clone)]
pub struct AppletDenyList {
    denied: HashSet<AppletId>,
}

impl AppletDenyList {
    pub fn new(denied: impl IntoIterator<Item = AppletId>) -> Self {
        Self {
            denied: denied.into_iter().collect(),
        }
    }
}

impl<C: ?Sized> HeaderFilter<C> for AppletDenyList {
    fn evaluate(&self, header: &CommandHeader, frame: &[u8], _ctx: &C) -> Verdict {
        if !header.is_open_session() {
            return Verdict::Accept;
        }
        match open_session_applet_id(header, frame) {
            Ok(applet) if self.denied.contains(&applet) => Verdict::Reject(REJECT_NOT_PERMITTED),
            Ok(_) => Verdict::Accept,
            Err(_) => Verdict::Reject(REJECT_INVALID),
        }
    }
}

/// Rejects frames that declare more than `max` bytes or whose declared
/// length disagrees with the bytes received.
#[derive(Debug, Clone, Copy)]
pub struct MaxFrameLength(pub usize);

impl<C: ?Sized> HeaderFilter<C> for MaxFrameLength {
    fn evaluate(&self, header: &CommandHeader, frame: &[u8], _ctx: &C) -> Verdict {
        let declared = header.length as usize;
        if declared > self.0 || declared != frame.len() {
            Verdict::Reject(REJECT_INVALID)
        } else {
            Verdict::Accept
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bhp_wire::{encode_command, response_header, Command, RESPONSE_HEADER_SIZE};

    use super::*;

    fn frame(seq: u64, command: &Command) -> Bytes {
        let mut buf = BytesMut::new();
        encode_command(seq, command, &[], &mut buf).unwrap();
        buf.freeze()
    }

    fn open(applet: [u8; 16]) -> Bytes {
        frame(11, &Command::open_session(AppletId::from_bytes(applet)))
    }

    #[test]
    fn empty_chain_accepts() {
        let chain: FilterChain = FilterChain::new();
        let raw = frame(1, &Command::list_packages());
        let header = command_header(&raw).unwrap();
        assert_eq!(chain.run(&header, &raw, &()), Verdict::Accept);
        assert_eq!(Verdict::Accept.as_code(), 0);
    }

    #[test]
    fn first_rejection_short_circuits() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let chain: FilterChain = FilterChain::new()
            .with(|_: &CommandHeader, _: &[u8], _: &()| Verdict::Accept)
            .with(|_: &CommandHeader, _: &[u8], _: &()| Verdict::Reject(-13))
            .with(move |_: &CommandHeader, _: &[u8], _: &()| {
                counter.fetch_add(1, Ordering::SeqCst);
                Verdict::Reject(-1)
            });

        let raw = frame(1, &Command::list_packages());
        let header = command_header(&raw).unwrap();
        assert_eq!(chain.run(&header, &raw, &()), Verdict::Reject(-13));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn context_reaches_filters() {
        struct Caller {
            privileged: bool,
        }
        let chain = FilterChain::<Caller>::new().with(
            |header: &CommandHeader, _: &[u8], caller: &Caller| {
                if header.id == CommandId::DownloadPackage && !caller.privileged {
                    Verdict::Reject(REJECT_NOT_PERMITTED)
                } else {
                    Verdict::Accept
                }
            },
        );

        let raw = frame(2, &Command::download_package(AppletId::from_bytes([1; 16])));
        let header = command_header(&raw).unwrap();
        assert!(chain.run(&header, &raw, &Caller { privileged: true }).is_accept());
        assert_eq!(
            chain.run(&header, &raw, &Caller { privileged: false }),
            Verdict::Reject(REJECT_NOT_PERMITTED)
        );
    }

    #[test]
    fn deny_echoes_sequence() {
        let response = deny(&frame(0xABCD, &Command::close_session(3))).unwrap();
        let header = response_header(&response).unwrap();
        assert_eq!(header.seq, 0xABCD);
        assert_eq!(header.code, code::OPERATION_NOT_PERMITTED);
        assert_eq!(header.length as usize, RESPONSE_HEADER_SIZE);
        assert_eq!(response.len(), RESPONSE_HEADER_SIZE);
    }

    #[test]
    fn deny_rejects_non_command_input() {
        assert!(deny(b"short").is_err());
        let not_command = deny(&frame(1, &Command::list_packages())).unwrap();
        assert!(deny(&not_command).is_err());
    }

    #[test]
    fn allow_list_filters_by_id() {
        let chain: FilterChain =
            FilterChain::new().with(CommandAllowList::new([CommandId::ListPackages]));
        let ok = frame(1, &Command::list_packages());
        let blocked = frame(2, &Command::close_session(9));
        assert!(chain.run(&command_header(&ok).unwrap(), &ok, &()).is_accept());
        assert_eq!(
            chain.run(&command_header(&blocked).unwrap(), &blocked, &()),
            Verdict::Reject(REJECT_NOT_PERMITTED)
        );
    }

    #[test]
    fn deny_list_checks_open_session_applet() {
        let chain: FilterChain =
            FilterChain::new().with(AppletDenyList::new([AppletId::from_bytes([7; 16])]));
        let denied = open([7; 16]);
        let allowed = open([8; 16]);
        assert_eq!(
            chain.run(&command_header(&denied).unwrap(), &denied, &()),
            Verdict::Reject(REJECT_NOT_PERMITTED)
        );
        assert!(chain
            .run(&command_header(&allowed).unwrap(), &allowed, &())
            .is_accept());
    }

    #[test]
    fn deny_list_rejects_truncated_open_session() {
        let full = open([7; 16]);
        let header = command_header(&full).unwrap();
        let filter = AppletDenyList::new([]);
        assert_eq!(
            HeaderFilter::<()>::evaluate(&filter, &header, &full[..30], &()),
            Verdict::Reject(REJECT_INVALID)
        );
    }

    #[test]
    fn max_length_checks_declared_and_actual() {
        let raw = open([1; 16]);
        let header = command_header(&raw).unwrap();
        let roomy = MaxFrameLength(1024);
        let tight = MaxFrameLength(raw.len() - 1);
        assert!(HeaderFilter::<()>::evaluate(&roomy, &header, &raw, &()).is_accept());
        assert!(!HeaderFilter::<()>::evaluate(&tight, &header, &raw, &()).is_accept());
        let short = &raw[..raw.len() - 1];
        assert!(!HeaderFilter::<()>::evaluate(&roomy, &header, short, &()).is_accept());
    }

    #[test]
    fn screen_forwards_or_denies() {
        let chain: FilterChain =
            FilterChain::new().with(CommandAllowList::new([CommandId::ListPackages]));

        let ok = frame(4, &Command::list_packages());
        assert!(matches!(
            chain.screen(&ok, &()).unwrap(),
            Screening::Forward(header) if header.seq == 4
        ));

        let blocked = frame(5, &Command::check_blocked_state(AppletId::from_bytes([0; 16])));
        match chain.screen(&blocked, &()).unwrap() {
            Screening::Deny { verdict, response } => {
                assert_eq!(verdict, REJECT_NOT_PERMITTED);
                assert_eq!(response_header(&response).unwrap().seq, 5);
            }
            other => panic!("expected denial, got {other:?}"),
        }

        assert!(chain.screen(b"garbage", &()).is_err());
    }
}
