use std::collections::HashMap;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bhp_wire::{Command, FrameConfig, Message, MessageReader, MessageWriter, WireError};
use tracing::{debug, info, warn};

use crate::destination::Destination;
use crate::error::{Result, TransportError};
use crate::traits::{ResponseSink, Transport};

/// Transport over one connected Unix stream per destination.
///
/// Commands are written under a per-destination lock; responses are read
/// by one thread per destination (see [`StreamTransport::start_receivers`]).
pub struct StreamTransport {
    links: HashMap<Destination, Link>,
    config: FrameConfig,
}

struct Link {
    writer: Mutex<MessageWriter<UnixStream>>,
    reader: Mutex<Option<UnixStream>>,
    control: UnixStream,
}

impl StreamTransport {
    /// Connect to the socket serving each destination.
    pub fn connect<P: AsRef<Path>>(endpoints: &[(Destination, P)]) -> Result<Self> {
        Self::connect_with_config(endpoints, FrameConfig::default())
    }

    pub fn connect_with_config<P: AsRef<Path>>(
        endpoints: &[(Destination, P)],
        config: FrameConfig,
    ) -> Result<Self> {
        let mut streams = Vec::with_capacity(endpoints.len());
        for (destination, path) in endpoints {
            let path = path.as_ref();
            let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
                path: PathBuf::from(path),
                source,
            })?;
            info!(%destination, ?path, "connected destination");
            streams.push((*destination, stream));
        }
        Self::from_streams(streams, config)
    }

    /// Build a transport from already connected streams.
    pub fn from_streams(
        streams: impl IntoIterator<Item = (Destination, UnixStream)>,
        config: FrameConfig,
    ) -> Result<Self> {
        let mut links = HashMap::new();
        for (destination, stream) in streams {
            stream.set_write_timeout(config.write_timeout)?;
            let reader = stream.try_clone()?;
            let control = stream.try_clone()?;
            let writer = MessageWriter::with_config(stream, config.clone());
            links.insert(
                destination,
                Link {
                    writer: Mutex::new(writer),
                    reader: Mutex::new(Some(reader)),
                    control,
                },
            );
        }
        Ok(Self { links, config })
    }

    /// Destinations with a live link.
    pub fn destinations(&self) -> Vec<Destination> {
        let mut out: Vec<Destination> = self.links.keys().copied().collect();
        out.sort();
        out
    }

    /// Spawn one reader thread per destination feeding responses into `sink`.
    ///
    /// Each destination's reader can be started only once; later calls skip it.
    pub fn start_receivers(&self, sink: Arc<dyn ResponseSink>) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();
        for (destination, link) in &self.links {
            let Some(stream) = link
                .reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            else {
                continue;
            };

            let destination = *destination;
            let sink = Arc::clone(&sink);
            let reader = MessageReader::with_config(stream, self.config.clone());
            let handle = std::thread::Builder::new()
                .name(format!("bhp-recv-{destination}"))
                .spawn(move || receive_loop(destination, reader, sink.as_ref()))?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Close every link; reader threads observe EOF and exit.
    pub fn shutdown(&self) {
        for (destination, link) in &self.links {
            if let Err(err) = link.control.shutdown(Shutdown::Both) {
                debug!(%destination, error = %err, "link already closed");
            }
        }
    }
}

impl Transport for StreamTransport {
    fn submit(
        &self,
        destination: Destination,
        command: &Command,
        payload: &[u8],
        seq: u64,
    ) -> Result<()> {
        let link = self
            .links
            .get(&destination)
            .ok_or(TransportError::NotConnected(destination))?;

        let mut writer = link.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer
            .send_command(seq, command, payload)
            .map_err(|err| match err {
                WireError::ConnectionClosed => TransportError::Shutdown,
                other => TransportError::Wire(other),
            })?;
        debug!(%destination, seq, command = command.id.name(), "submitted command");
        Ok(())
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(
    destination: Destination,
    mut reader: MessageReader<UnixStream>,
    sink: &dyn ResponseSink,
) {
    read_responses(destination, &mut reader, sink);
    sink.link_closed(destination);
}

fn read_responses(
    destination: Destination,
    reader: &mut MessageReader<UnixStream>,
    sink: &dyn ResponseSink,
) {
    loop {
        match reader.read_message() {
            Ok(message @ Message::Response { .. }) => {
                sink.deliver(destination, message.frame().clone());
            }
            Ok(Message::Command { header, .. }) => {
                warn!(%destination, seq = header.seq, "ignoring command frame on response link");
            }
            Err(WireError::ConnectionClosed) => {
                debug!(%destination, "response link closed");
                return;
            }
            Err(err) => {
                warn!(%destination, error = %err, "response link failed");
                return;
            }
        }
    }
}
