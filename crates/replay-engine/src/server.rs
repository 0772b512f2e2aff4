//! TCP Replay Server
//!
//! Each accepted client gets its own session: wait for `START`, stream the
//! merged trace with original timing, then send `SIMULATION_COMPLETE`.

use crate::error::ReplayError;
use crate::scheduler::{MergedStream, Pacer, ReplayEvent};
use can_protocol::control;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use trace_store::{CanTrace, GpsTrace};

/// Replay server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Listen address
    pub bind_addr: String,
    /// Yield-spin window before each deadline (microseconds)
    pub spin_window_us: u64,
    /// Delivery lag above which an event counts as late (ms)
    pub lag_warn_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:54000".to_string(),
            spin_window_us: 1000,
            lag_warn_ms: 10,
        }
    }
}

impl ReplayConfig {
    fn spin_window(&self) -> Duration {
        Duration::from_micros(self.spin_window_us)
    }

    fn lag_threshold(&self) -> Duration {
        Duration::from_millis(self.lag_warn_ms)
    }
}

/// Outcome of one replay session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// CAN lines written
    pub can_sent: usize,
    /// GPS lines written
    pub gps_sent: usize,
    /// Events delivered later than the lag threshold
    pub late_events: usize,
    /// Worst delivery lag
    pub max_lag: Duration,
    /// Time from anchor to completion marker
    pub duration: Duration,
}

impl SessionReport {
    /// Total events written
    pub fn events_sent(&self) -> usize {
        self.can_sent + self.gps_sent
    }

    fn record(&mut self, event: &ReplayEvent, lag: Duration, threshold: Duration) {
        match event {
            ReplayEvent::Can(_) => self.can_sent += 1,
            ReplayEvent::Gps(_) => self.gps_sent += 1,
        }
        if lag > threshold {
            self.late_events += 1;
        }
        self.max_lag = self.max_lag.max(lag);
    }
}

/// Handle for stopping a running server from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Stop accepting new clients
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Serves the loaded traces to every client that connects
pub struct ReplayServer {
    config: ReplayConfig,
    can: CanTrace,
    gps: GpsTrace,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ReplayServer {
    /// Create a server; refuses traces without data
    pub fn new(config: ReplayConfig, can: CanTrace, gps: GpsTrace) -> Result<Self, ReplayError> {
        if can.is_empty() {
            return Err(ReplayError::EmptyTrace("CAN"));
        }
        if gps.is_empty() {
            return Err(ReplayError::EmptyTrace("GPS"));
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            can,
            gps,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Handle that stops the accept loop
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, ReplayError> {
        TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| ReplayError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })
    }

    /// Bind the configured address and serve until stopped
    pub async fn serve(&self) -> Result<(), ReplayError> {
        let listener = self.bind().await?;
        self.run(listener).await
    }

    /// Accept clients on `listener` until stopped.
    ///
    /// Sessions already running keep going after a stop.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ReplayError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Ok(());
        }

        if let Ok(addr) = listener.local_addr() {
            info!(
                "Replay server listening on {} ({} CAN frames, {} GPS fixes)",
                addr,
                self.can.len(),
                self.gps.len()
            );
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        info!("Client connected: {}", peer);
                        let can = self.can.clone();
                        let gps = self.gps.clone();
                        let config = self.config.clone();

                        tokio::spawn(async move {
                            match handle_client(socket, can, gps, &config).await {
                                Ok(report) => info!(
                                    "{} done: {} CAN, {} GPS, {} late, max lag {:?}",
                                    peer,
                                    report.can_sent,
                                    report.gps_sent,
                                    report.late_events,
                                    report.max_lag
                                ),
                                Err(e) => warn!("Session with {} ended: {}", peer, e),
                            }
                        });
                    }
                    Err(e) => warn!("Error accepting client connection: {}", e),
                },
                _ = shutdown.changed() => {
                    info!("Replay server stopping");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_client(
    socket: TcpStream,
    can: CanTrace,
    gps: GpsTrace,
    config: &ReplayConfig,
) -> Result<SessionReport, ReplayError> {
    socket.set_nodelay(true)?;
    let (read_half, write_half) = socket.into_split();
    run_session(BufReader::new(read_half), write_half, can, gps, config).await
}

/// Run one replay session over any line-oriented stream.
///
/// The first line from the client must be `START`. Events are then written
/// one per line at their original offsets, followed by the completion marker.
pub async fn run_session<R, W>(
    reader: R,
    mut writer: W,
    can: CanTrace,
    gps: GpsTrace,
    config: &ReplayConfig,
) -> Result<SessionReport, ReplayError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    match lines.next_line().await? {
        Some(line) if line.trim() == control::START => {}
        Some(line) => return Err(ReplayError::Handshake(line)),
        None => return Err(ReplayError::Handshake("connection closed".to_string())),
    }

    let threshold = config.lag_threshold();
    let pacer = Pacer::start(config.spin_window());
    let mut report = SessionReport::default();

    for event in MergedStream::new(can, gps) {
        let lag = pacer.wait_until(event.offset_ms()).await;
        if lag > threshold {
            debug!("Event at {:.1} ms sent {:?} late", event.offset_ms(), lag);
        }

        let mut line = event.to_line();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        report.record(&event, lag, threshold);
        metrics::counter!("replay.events_sent").increment(1);
    }

    writer
        .write_all(format!("{}\n", control::SIMULATION_COMPLETE).as_bytes())
        .await?;
    writer.flush().await?;
    report.duration = pacer.elapsed();

    if report.late_events > 0 {
        warn!(
            "{} of {} events exceeded {:?} lag (max {:?})",
            report.late_events,
            report.events_sent(),
            threshold,
            report.max_lag
        );
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Socket shutdown after replay failed: {}", e);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_protocol::{CanFrame, GpsFix, WireMessage};
    use tokio::io::duplex;

    fn traces() -> (CanTrace, GpsTrace) {
        let can = CanTrace::from_vec(vec![
            CanFrame::decode("0018", "0800000000000000", 0.0).unwrap(),
            CanFrame::decode("0F7A", "01C2000000000000", 5.0).unwrap(),
            CanFrame::decode("0B41", "80640000808C0000", 30.0).unwrap(),
        ]);
        let gps = GpsTrace::from_vec(vec![
            GpsFix::new(48.1, 11.5, 0.0),
            GpsFix::new(48.2, 11.6, 20.0),
        ]);
        (can, gps)
    }

    async fn read_all<R: AsyncBufRead + Unpin>(reader: R) -> Vec<String> {
        let mut lines = reader.lines();
        let mut out = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_empty_trace_rejected() {
        let (can, _) = traces();
        let result = ReplayServer::new(ReplayConfig::default(), can, GpsTrace::new());
        assert!(matches!(result, Err(ReplayError::EmptyTrace("GPS"))));

        let (_, gps) = traces();
        let result = ReplayServer::new(ReplayConfig::default(), CanTrace::new(), gps);
        assert!(matches!(result, Err(ReplayError::EmptyTrace("CAN"))));
    }

    #[tokio::test]
    async fn test_session_streams_in_order() {
        let (can, gps) = traces();
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        let session = tokio::spawn(async move {
            let config = ReplayConfig::default();
            run_session(BufReader::new(server_read), server_write, can, gps, &config).await
        });

        client_write.write_all(b"START\n").await.unwrap();
        let lines = read_all(BufReader::new(client_read)).await;
        let report = session.await.unwrap().unwrap();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines.last().map(String::as_str), Some(control::SIMULATION_COMPLETE));

        let messages: Vec<WireMessage> = lines
            .iter()
            .map(|l| WireMessage::parse(l).unwrap())
            .collect();
        // GPS fix at 0 ms precedes the CAN frame at 0 ms
        assert!(matches!(messages[0], WireMessage::Gps { .. }));
        assert!(matches!(messages[1], WireMessage::Can { .. }));

        let offsets: Vec<f64> = messages.iter().filter_map(|m| m.timestamp_ms()).collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(report.can_sent, 3);
        assert_eq!(report.gps_sent, 2);
        assert!(report.duration >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_session_requires_start() {
        let (can, gps) = traces();
        let (client, server) = duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(b"HELLO\n").await.unwrap();
        let config = ReplayConfig::default();
        let result =
            run_session(BufReader::new(server_read), server_write, can, gps, &config).await;

        assert!(matches!(result, Err(ReplayError::Handshake(line)) if line == "HELLO"));
    }

    #[tokio::test]
    async fn test_each_client_gets_full_replay() {
        let (can, gps) = traces();
        let server = Arc::new(ReplayServer::new(ReplayConfig::default(), can, gps).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run(listener).await })
        };

        for _ in 0..2 {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            write_half.write_all(b"START\n").await.unwrap();

            let lines = read_all(BufReader::new(read_half)).await;
            assert_eq!(lines.len(), 6);
        }

        server.shutdown_handle().stop();
        running.await.unwrap().unwrap();
    }
}
