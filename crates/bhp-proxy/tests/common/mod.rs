#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use bhp_proxy::{AppletIdResolver, HostProxy, ProxyConfig, UuidResolver};
use bhp_transport::{Destination, ResponseSink, Transport, TransportError};
use bhp_wire::command::{parse_applet_body, parse_session_addr};
use bhp_wire::response::encode_package_list;
use bhp_wire::{
    code, encode_command, encode_response, AppletId, BufferTooSmall, Command, CommandHeader,
    CommandId, Message, MessageReader, MessageWriter, SendRecvBody, SendRecvRequest, WireError,
    COMMAND_HEADER_SIZE,
};
use bytes::{Bytes, BytesMut};

pub const APPLET: &str = "3c4724a3-b9b6-4a4b-a3f8-95cd8a2a0a86";
pub const OTHER_APPLET: &str = "9f0e3a11-52cd-4c8e-8f6b-0d7a3e21b4c5";

/// Applet command: return the input unchanged.
pub const ECHO: i32 = 1;
/// Applet command: return `input[0]` bytes of 0x5A.
pub const FILL: i32 = 2;

pub fn applet_id(text: &str) -> AppletId {
    UuidResolver.resolve(text).unwrap()
}

/// In-memory stand-in for the firmware on both VMs.
#[derive(Debug)]
pub struct VmModel {
    pub resident: HashSet<AppletId>,
    pub blocked: HashSet<AppletId>,
    pub sessions: HashMap<u64, AppletId>,
    next_addr: u64,

    pub downloads: usize,
    pub opens: usize,
    pub lists: usize,
    pub block_checks: usize,
    pub sends: usize,
    pub closes: usize,
    pub destinations: Vec<(CommandId, Destination)>,

    /// Opens that find their package evicted just before they run.
    pub evict_before_open: usize,
    /// Downloads report success without installing anything.
    pub ignore_downloads: bool,
    pub list_fails: bool,
    /// Result code forced onto the next send or close.
    pub fault_next: Option<i32>,
    /// Result codes returned by the next closes, in order.
    pub close_codes: VecDeque<i32>,
    /// Result codes returned by the next downloads, in order.
    pub download_codes: VecDeque<i32>,
    /// Raw `(code, body)` returned by the next send.
    pub send_override: Option<(i32, Vec<u8>)>,
    /// Return output even when it exceeds the declared capacity.
    pub ignore_capacity: bool,
}

impl Default for VmModel {
    fn default() -> Self {
        Self {
            resident: HashSet::new(),
            blocked: HashSet::new(),
            sessions: HashMap::new(),
            next_addr: 0x1000,
            downloads: 0,
            opens: 0,
            lists: 0,
            block_checks: 0,
            sends: 0,
            closes: 0,
            destinations: Vec::new(),
            evict_before_open: 0,
            ignore_downloads: false,
            list_fails: false,
            fault_next: None,
            close_codes: VecDeque::new(),
            download_codes: VecDeque::new(),
            send_override: None,
            ignore_capacity: false,
        }
    }
}

impl VmModel {
    pub fn with_resident(ids: &[&str]) -> Self {
        Self {
            resident: ids.iter().map(|text| applet_id(text)).collect(),
            ..Self::default()
        }
    }

    /// Answer one command: `(code, addr, body)`.
    pub fn handle(
        &mut self,
        destination: Destination,
        header: &CommandHeader,
        body: &[u8],
    ) -> (i32, u64, Vec<u8>) {
        self.destinations.push((header.id, destination));
        match header.id {
            CommandId::ListPackages => {
                self.lists += 1;
                if self.list_fails {
                    return (code::INTERNAL_ERROR, 0, Vec::new());
                }
                let mut ids: Vec<AppletId> = self.resident.iter().copied().collect();
                ids.sort();
                let mut out = BytesMut::new();
                encode_package_list(&ids, &mut out);
                (code::SUCCESS, 0, out.to_vec())
            }
            CommandId::DownloadPackage => {
                self.downloads += 1;
                let applet = parse_applet_body(body).unwrap();
                if body.len() == AppletId::SIZE {
                    return (code::INVALID_PARAMS, 0, Vec::new());
                }
                if let Some(forced) = self.download_codes.pop_front() {
                    return (forced, 0, Vec::new());
                }
                if self.resident.contains(&applet) {
                    return (code::PACKAGE_EXIST, 0, Vec::new());
                }
                if !self.ignore_downloads {
                    self.resident.insert(applet);
                }
                (code::SUCCESS, 0, Vec::new())
            }
            CommandId::CheckBlockedState => {
                self.block_checks += 1;
                let applet = parse_applet_body(body).unwrap();
                if self.blocked.contains(&applet) {
                    (code::APPLET_BLOCKED, 0, Vec::new())
                } else {
                    (code::SUCCESS, 0, Vec::new())
                }
            }
            CommandId::OpenSession => {
                self.opens += 1;
                let applet = parse_applet_body(body).unwrap();
                if self.evict_before_open > 0 {
                    self.evict_before_open -= 1;
                    self.resident.remove(&applet);
                }
                if !self.resident.contains(&applet) {
                    return (code::PACKAGE_NOT_FOUND, 0, Vec::new());
                }
                let addr = self.next_addr;
                self.next_addr += 0x100;
                self.sessions.insert(addr, applet);
                (code::SUCCESS, addr, Vec::new())
            }
            CommandId::SendAndRecv => {
                self.sends += 1;
                let request = SendRecvRequest::parse(body).unwrap();
                let input = &body[SendRecvRequest::SIZE..];
                let addr = request.session_addr;
                if !self.sessions.contains_key(&addr) {
                    return (code::INVALID_PARAMS, addr, Vec::new());
                }
                if let Some(fault) = self.fault_next.take() {
                    return (fault, addr, Vec::new());
                }
                if let Some((forced, body)) = self.send_override.take() {
                    return (forced, addr, body);
                }

                let output = match request.command {
                    ECHO => input.to_vec(),
                    FILL => vec![0x5A; input.first().copied().unwrap_or(0) as usize],
                    _ => Vec::new(),
                };
                let response_code = request.command * 100;
                let mut out = BytesMut::new();
                if output.len() > request.capacity as usize && !self.ignore_capacity {
                    BufferTooSmall {
                        response_code,
                        required: output.len() as u32,
                    }
                    .write(&mut out);
                    return (code::APPLET_SMALL_BUFFER, addr, out.to_vec());
                }
                SendRecvBody {
                    response_code,
                    output: &output,
                }
                .write(&mut out);
                (code::SUCCESS, addr, out.to_vec())
            }
            CommandId::CloseSession => {
                self.closes += 1;
                let addr = parse_session_addr(body).unwrap();
                if let Some(forced) = self.close_codes.pop_front() {
                    return (forced, addr, Vec::new());
                }
                if let Some(fault) = self.fault_next.take() {
                    return (fault, addr, Vec::new());
                }
                match self.sessions.remove(&addr) {
                    Some(_) => (code::SUCCESS, addr, Vec::new()),
                    None => (code::INVALID_PARAMS, addr, Vec::new()),
                }
            }
            CommandId::Other(_) => (code::INVALID_PARAMS, 0, Vec::new()),
        }
    }

    fn respond(&mut self, destination: Destination, frame: &[u8], header: &CommandHeader) -> Bytes {
        let body = &frame[COMMAND_HEADER_SIZE..];
        let (result, addr, body) = self.handle(destination, header, body);
        let mut out = BytesMut::new();
        encode_response(header.seq, addr, result, &body, &mut out).unwrap();
        out.freeze()
    }
}

/// Transport that answers every command synchronously from inside
/// `submit`, through the proxy's inbound sink.
pub struct FakeVm {
    model: Arc<Mutex<VmModel>>,
    sink: OnceLock<Arc<dyn ResponseSink>>,
    pub fail_submit: AtomicBool,
    pub drop_responses: AtomicBool,
}

impl FakeVm {
    pub fn new(model: VmModel) -> Arc<Self> {
        Arc::new(Self {
            model: Arc::new(Mutex::new(model)),
            sink: OnceLock::new(),
            fail_submit: AtomicBool::new(false),
            drop_responses: AtomicBool::new(false),
        })
    }

    pub fn attach(&self, sink: Arc<dyn ResponseSink>) {
        assert!(self.sink.set(sink).is_ok(), "sink attached twice");
    }

    pub fn model(&self) -> MutexGuard<'_, VmModel> {
        self.model.lock().unwrap()
    }
}

impl Transport for FakeVm {
    fn submit(
        &self,
        destination: Destination,
        command: &Command,
        payload: &[u8],
        seq: u64,
    ) -> Result<(), TransportError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }
        let mut frame = BytesMut::new();
        encode_command(seq, command, payload, &mut frame)?;
        let header = bhp_wire::command_header(&frame)?;
        let response = self.model().respond(destination, &frame, &header);

        if !self.drop_responses.load(Ordering::SeqCst) {
            let sink = self.sink.get().expect("sink not attached");
            sink.deliver(destination, response);
        }
        Ok(())
    }
}

pub fn test_config() -> ProxyConfig {
    ProxyConfig {
        response_timeout: Some(Duration::from_secs(5)),
        ..ProxyConfig::default()
    }
}

/// Proxy wired to a synchronous fake VM.
pub fn fake_proxy(model: VmModel) -> (Arc<FakeVm>, HostProxy) {
    let vm = FakeVm::new(model);
    let proxy = HostProxy::with_config(vm.clone(), test_config());
    vm.attach(proxy.inbound());
    (vm, proxy)
}

/// Serve commands arriving on `stream` until the host hangs up.
pub fn serve(
    destination: Destination,
    stream: UnixStream,
    model: Arc<Mutex<VmModel>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = MessageReader::new(stream.try_clone().unwrap());
        let mut writer = MessageWriter::new(stream);
        loop {
            match reader.read_message() {
                Ok(Message::Command { header, frame }) => {
                    let response = model.lock().unwrap().respond(destination, &frame, &header);
                    let reply = Message::Response {
                        header: bhp_wire::response_header(&response).unwrap(),
                        frame: response,
                    };
                    if writer.write_message(&reply).is_err() {
                        return;
                    }
                }
                Ok(Message::Response { .. }) => panic!("VM received a response frame"),
                Err(WireError::ConnectionClosed) => return,
                Err(err) => panic!("VM link failed: {err}"),
            }
        }
    })
}
