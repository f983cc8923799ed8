#![cfg(unix)]

mod common;

use std::os::unix::net::UnixStream;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use bhp_proxy::{CloseOutcome, HostProxy, ProxyError, SendReply};
use bhp_transport::{Destination, StreamTransport, TransportError};
use bhp_wire::{FrameConfig, MessageReader};
use common::{fake_proxy, serve, test_config, VmModel, APPLET, ECHO, FILL};

const PACKAGE: &[u8] = &[0xA5; 200];

#[test]
fn provision_send_too_small_then_close() {
    let (vm, proxy) = fake_proxy(VmModel::default());

    let handle = proxy
        .open_session(APPLET, &[], PACKAGE)
        .expect("open should succeed");
    assert_ne!(handle.as_u64(), 0);
    {
        let model = vm.model();
        assert_eq!(model.downloads, 1);
        assert_eq!(model.opens, 1);
    }

    let reply = proxy
        .send_and_receive(handle, FILL, &[50], 10)
        .expect("send should succeed");
    assert_eq!(
        reply,
        SendReply::BufferTooSmall {
            required: 50,
            response_code: FILL * 100,
        }
    );

    assert_eq!(
        proxy.close_session(handle).expect("close should succeed"),
        CloseOutcome::Closed
    );
    assert!(matches!(
        proxy.send_and_receive(handle, ECHO, b"x", 10),
        Err(ProxyError::NoSession(_))
    ));
}

struct Harness {
    proxy: HostProxy,
    transport: Arc<StreamTransport>,
    model: Arc<Mutex<VmModel>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Harness {
    fn start(model: VmModel) -> Self {
        let model = Arc::new(Mutex::new(model));
        let (ivm_host, ivm_vm) = UnixStream::pair().expect("socket pair");
        let (svm_host, svm_vm) = UnixStream::pair().expect("socket pair");

        let mut threads = vec![
            serve(Destination::Ivm, ivm_vm, Arc::clone(&model)),
            serve(Destination::Svm, svm_vm, Arc::clone(&model)),
        ];

        let transport = Arc::new(
            StreamTransport::from_streams(
                [(Destination::Ivm, ivm_host), (Destination::Svm, svm_host)],
                FrameConfig::default(),
            )
            .expect("transport should build"),
        );
        let proxy = HostProxy::with_config(transport.clone(), test_config());
        threads.extend(
            transport
                .start_receivers(proxy.inbound())
                .expect("receivers should start"),
        );

        Self {
            proxy,
            transport,
            model,
            threads,
        }
    }

    fn stop(self) {
        self.transport.shutdown();
        for handle in self.threads {
            handle.join().expect("thread should exit cleanly");
        }
    }
}

#[test]
fn full_flow_over_unix_streams() {
    let harness = Harness::start(VmModel::default());
    let proxy = &harness.proxy;

    let handle = proxy
        .open_session(APPLET, b"init", PACKAGE)
        .expect("open should succeed");

    let reply = proxy
        .send_and_receive(handle, ECHO, b"over the wire", 64)
        .expect("send should succeed");
    match reply {
        SendReply::Complete { output, .. } => assert_eq!(output.as_ref(), b"over the wire"),
        other => panic!("expected output, got {other:?}"),
    }

    let reply = proxy
        .send_and_receive(handle, FILL, &[50], 10)
        .expect("send should succeed");
    assert!(matches!(
        reply,
        SendReply::BufferTooSmall { required: 50, .. }
    ));

    assert_eq!(
        proxy.close_session(handle).expect("close should succeed"),
        CloseOutcome::Closed
    );
    {
        let model = harness.model.lock().expect("model lock");
        assert_eq!(model.downloads, 1);
        assert_eq!(model.opens, 1);
        assert!(model.sessions.is_empty());
    }
    harness.stop();
}

#[test]
fn concurrent_callers_share_and_split_sessions() {
    let harness = Harness::start(VmModel::default());
    let proxy = &harness.proxy;

    let shared = proxy
        .open_session(APPLET, &[], PACKAGE)
        .expect("open should succeed");

    thread::scope(|scope| {
        for worker in 0..6u8 {
            scope.spawn(move || {
                let own = proxy
                    .open_session(APPLET, &[], PACKAGE)
                    .expect("open should succeed");
                for round in 0..20u8 {
                    let target = if round % 2 == 0 { shared } else { own };
                    let input = [worker, round, 0xEE];
                    match proxy
                        .send_and_receive(target, ECHO, &input, 16)
                        .expect("send should succeed")
                    {
                        SendReply::Complete { output, .. } => assert_eq!(output.as_ref(), &input),
                        other => panic!("expected output, got {other:?}"),
                    }
                }
                proxy.close_session(own).expect("close should succeed");
            });
        }
    });

    proxy.close_session(shared).expect("close should succeed");
    assert_eq!(proxy.sessions().live_sessions(), 0);
    assert!(proxy.registry().is_empty());
    assert_eq!(harness.model.lock().expect("model lock").downloads, 1);
    harness.stop();
}

#[test]
fn waiting_caller_fails_when_vm_hangs_up() {
    let (host, vm) = UnixStream::pair().expect("socket pair");
    let vm = thread::spawn(move || {
        let mut reader = MessageReader::new(vm);
        reader.read_message().expect("command should arrive");
        // Dropping the reader closes the VM side without answering.
    });

    let transport = Arc::new(
        StreamTransport::from_streams([(Destination::Ivm, host)], FrameConfig::default())
            .expect("transport should build"),
    );
    let proxy = Arc::new(HostProxy::new(transport.clone()));
    assert_eq!(proxy.config().response_timeout, None);
    let receivers = transport
        .start_receivers(proxy.inbound())
        .expect("receivers should start");

    let (tx, rx) = mpsc::channel();
    let caller = {
        let proxy = Arc::clone(&proxy);
        thread::spawn(move || {
            let _ = tx.send(proxy.list_packages(Destination::Ivm));
        })
    };

    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("caller should return once the link closes");
    assert!(matches!(
        outcome,
        Err(ProxyError::Transport(TransportError::Shutdown))
    ));
    assert!(proxy.registry().is_empty());

    caller.join().expect("caller thread");
    vm.join().expect("vm thread");
    for handle in receivers {
        handle.join().expect("receiver thread");
    }
}
