//! # Handler Service
//!
//! The message router. Packets arriving on a session are decoded into
//! messages, classified by route and queued for one of two worker pools:
//!
//! ```text
//! packet ─▶ process_packet ─┬─▶ local queue  ─▶ dispatch workers ─▶ registry handler ─┐
//!                           └─▶ remote queue ─▶ remote workers   ─▶ RemoteService ─────┤
//!                                                                                     ▼
//!                                       session outbound ◀─ response (requests only)
//! ```
//!
//! Both queues are bounded; producers wait while a queue is full. Requests get
//! exactly one response carrying their id, whether the handler succeeded,
//! failed or panicked. Notifies never get one.
//!
//! When the die signal fires, workers close their queue, run what is already
//! queued for at most `drain_timeout`, then exit. Requests that arrive after
//! the signal, or that are still queued when the drain window ends, are
//! answered with `SHUTTING_DOWN`.

use crate::cluster::Server;
use crate::component::{ComponentRegistry, HandlerProvider, RegisterOptions, Request};
use crate::core::codec::{PacketBatches, PacketCodec, PacketDecoder, PacketEncoder};
use crate::core::message::{peek_id, Message, MessageCodec, MessageEncoder, MessageType};
use crate::core::packet::{Packet, PacketType};
use crate::core::serialization::SerializationFormat;
use crate::error::{constants, ErrorPayload, ProtocolError, Result};
use crate::protocol::handshake::{parse_handshake, HandshakeResponse, KickReason};
use crate::protocol::route::Route;
use crate::service::remote::RemoteService;
use crate::session::{HeartbeatMonitor, Session, SessionPool, SessionState};
use crate::utils::die::DieSignal;
use crate::utils::guard::guarded;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::{heartbeat_interval, DRAIN_TIMEOUT, HEARTBEAT_TIMEOUT};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, instrument, trace, warn};

/// Everything a [`HandlerService`] is configured with.
#[derive(Clone)]
pub struct HandlerServiceOptions {
    pub decoder: Arc<dyn PacketDecoder>,
    pub encoder: Arc<dyn PacketEncoder>,
    pub serializer: SerializationFormat,
    /// Sessions silent for longer than this are kicked; zero disables the check
    pub heartbeat_timeout: Duration,
    /// Outbound packets buffered per session
    pub messages_buffer_size: usize,
    /// Capacity of the local dispatch queue
    pub local_process_buffer_size: usize,
    /// Capacity of the remote dispatch queue
    pub remote_process_buffer_size: usize,
    /// Workers per queue
    pub workers: usize,
    pub drain_timeout: Duration,
    pub message_encoder: Arc<dyn MessageEncoder>,
}

impl Default for HandlerServiceOptions {
    fn default() -> Self {
        Self {
            decoder: Arc::new(PacketCodec::default()),
            encoder: Arc::new(PacketCodec::default()),
            serializer: SerializationFormat::default(),
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            messages_buffer_size: 100,
            local_process_buffer_size: 100,
            remote_process_buffer_size: 100,
            workers: 4,
            drain_timeout: DRAIN_TIMEOUT,
            message_encoder: Arc::new(MessageCodec::new(false)),
        }
    }
}

impl std::fmt::Debug for HandlerServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerServiceOptions")
            .field("serializer", &self.serializer)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("messages_buffer_size", &self.messages_buffer_size)
            .field("local_process_buffer_size", &self.local_process_buffer_size)
            .field("remote_process_buffer_size", &self.remote_process_buffer_size)
            .field("workers", &self.workers)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

impl HandlerServiceOptions {
    /// Problems that make the options unusable. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.messages_buffer_size == 0 {
            errors.push("messages buffer size must be greater than 0".to_string());
        }
        if self.local_process_buffer_size == 0 {
            errors.push("local process buffer size must be greater than 0".to_string());
        }
        if self.remote_process_buffer_size == 0 {
            errors.push("remote process buffer size must be greater than 0".to_string());
        }
        if self.workers == 0 {
            errors.push("worker count must be greater than 0".to_string());
        }
        errors
    }
}

/// A message waiting in one of the dispatch queues.
struct Unhandled {
    session: Arc<Session>,
    route: Route,
    message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Local,
    Remote,
}

impl Lane {
    fn as_str(self) -> &'static str {
        match self {
            Lane::Local => "local",
            Lane::Remote => "remote",
        }
    }
}

/// Background tasks started by [`HandlerService::start`].
#[derive(Debug)]
pub struct DispatchHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

pub struct HandlerService {
    die: DieSignal,
    server: Server,
    remote: Option<Arc<dyn RemoteService>>,
    options: HandlerServiceOptions,
    registry: ComponentRegistry,
    pool: Arc<SessionPool>,
    metrics: Arc<Metrics>,
    local_tx: mpsc::Sender<Unhandled>,
    local_rx: Mutex<mpsc::Receiver<Unhandled>>,
    remote_tx: mpsc::Sender<Unhandled>,
    remote_rx: Mutex<mpsc::Receiver<Unhandled>>,
}

impl HandlerService {
    /// Build a service with an empty registry. Options are checked by
    /// [`HandlerService::start`].
    pub fn new(
        die: DieSignal,
        server: Server,
        remote: Option<Arc<dyn RemoteService>>,
        options: HandlerServiceOptions,
    ) -> Self {
        let (local_tx, local_rx) = mpsc::channel(options.local_process_buffer_size.max(1));
        let (remote_tx, remote_rx) = mpsc::channel(options.remote_process_buffer_size.max(1));
        Self {
            die,
            server,
            remote,
            options,
            registry: ComponentRegistry::new(),
            pool: Arc::new(SessionPool::new()),
            metrics: Arc::new(Metrics::new()),
            local_tx,
            local_rx: Mutex::new(local_rx),
            remote_tx,
            remote_rx: Mutex::new(remote_rx),
        }
    }

    pub fn register<C: HandlerProvider>(
        &mut self,
        component: Arc<C>,
        options: RegisterOptions,
    ) -> Result<()> {
        self.registry.register(component, options)
    }

    pub fn options(&self) -> &HandlerServiceOptions {
        &self.options
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn die_signal(&self) -> &DieSignal {
        &self.die
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn has_remote_service(&self) -> bool {
        self.remote.is_some()
    }

    /// Capacity of the local and remote queues.
    pub fn queue_capacities(&self) -> (usize, usize) {
        (self.local_tx.max_capacity(), self.remote_tx.max_capacity())
    }

    /// Open a tracked session. The receiver yields the encoded packets to
    /// write to the client.
    pub fn new_session(&self) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let (session, outbound) = self.pool.create(self.options.messages_buffer_size);
        self.metrics.session_opened();
        debug!(session_id = session.id(), "Session opened");
        (session, outbound)
    }

    /// Close a session and stop tracking it.
    pub fn close_session(&self, session: &Session) {
        session.close();
        if self.pool.remove(session.id()).is_some() {
            self.metrics.session_closed();
        }
    }

    /// Tell the client why it is being disconnected, then close the session.
    pub fn kick(&self, session: &Session, reason: &str) -> Result<()> {
        let body = KickReason {
            reason: reason.to_string(),
        }
        .to_bytes()?;
        let packet = self.options.encoder.encode_packet(PacketType::Kick, &body)?;
        let queued = session.try_send(packet);
        info!(session_id = session.id(), reason, "Kicking session");
        self.close_session(session);
        match queued {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(session_id = session.id(), "Outbound full, kick reason dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send a server-initiated push on `route`.
    pub async fn push(&self, session: &Session, route: &str, data: impl Into<Bytes>) -> Result<()> {
        let message = Message::push(route, data);
        self.send_message(session, &message).await
    }

    /// Handle one inbound packet.
    #[instrument(skip_all, fields(session_id = session.id(), kind = ?packet.kind))]
    pub async fn process_packet(&self, session: &Arc<Session>, packet: Packet) -> Result<()> {
        self.metrics.packet_received();
        session.touch();

        match packet.kind {
            PacketType::Handshake => self.handshake(session, &packet.body).await,
            PacketType::HandshakeAck | PacketType::Heartbeat => {
                trace!("Liveness packet");
                Ok(())
            }
            PacketType::Kick => {
                debug!("Client asked to disconnect");
                self.close_session(session);
                Ok(())
            }
            PacketType::Data => {
                if session.is_closed() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                if !session.is_active() {
                    warn!("{}", constants::ERR_DATA_BEFORE_HANDSHAKE);
                    return Err(ProtocolError::UnexpectedMessage);
                }
                self.process_data(session, &packet.body).await
            }
        }
    }

    async fn handshake(&self, session: &Arc<Session>, body: &[u8]) -> Result<()> {
        let request = parse_handshake(body)?;
        if !session.transition(
            &[SessionState::Connecting, SessionState::Handshaking],
            SessionState::Handshaking,
        ) {
            return Err(if session.is_closed() {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::HandshakeError("handshake already completed".into())
            });
        }
        session.set_client(request.sys);

        let response = HandshakeResponse::new(
            heartbeat_interval(self.options.heartbeat_timeout),
            self.options.serializer.name(),
            self.options.message_encoder.route_dictionary(),
        );
        let packet = self
            .options
            .encoder
            .encode_packet(PacketType::Handshake, &response.to_bytes()?)?;
        session.send(packet).await?;

        session.transition(&[SessionState::Handshaking], SessionState::Active);
        debug!(session_id = session.id(), "Handshake completed");
        Ok(())
    }

    async fn process_data(&self, session: &Arc<Session>, body: &[u8]) -> Result<()> {
        if body.is_empty() {
            return Ok(());
        }
        match self.options.message_encoder.decode(body) {
            Ok(message) => self.route_message(session, message).await,
            Err(e) => {
                self.metrics.decode_error();
                match peek_id(body) {
                    Some((MessageType::Request, id)) if id != 0 => {
                        warn!(id, error = %e, "Malformed request");
                        self.respond(session, id, Err(e)).await;
                    }
                    _ => warn!(error = %e, "Dropping undecodable message"),
                }
                Ok(())
            }
        }
    }

    /// Classify a decoded message and queue it for a worker.
    async fn route_message(&self, session: &Arc<Session>, message: Message) -> Result<()> {
        self.metrics.message_received();

        if !matches!(message.kind, MessageType::Request | MessageType::Notify) {
            warn!(kind = ?message.kind, "Clients may only send requests and notifies");
            return Ok(());
        }

        if self.die.is_fired() {
            return self.reject(session, &message, ProtocolError::ShuttingDown).await;
        }

        let route = match Route::decode(&message.route) {
            Ok(route) => route,
            Err(e) => return self.reject(session, &message, e).await,
        };

        let lane = if route.is_remote_for(&self.server.server_type) {
            if self.remote.is_none() {
                let e = ProtocolError::RemoteError(constants::ERR_NO_REMOTE_SERVICE.into());
                return self.reject(session, &message, e).await;
            }
            Lane::Remote
        } else {
            Lane::Local
        };

        if message.expects_response() && !session.begin_request(message.id) {
            let e = ProtocolError::InvalidMessage(format!("request id {} already pending", message.id));
            return self.reject(session, &message, e).await;
        }

        trace!(route = %route, lane = lane.as_str(), "Queueing message");
        session.begin_work();
        let work = Unhandled {
            session: session.clone(),
            route,
            message,
        };
        let tx = match lane {
            Lane::Local => &self.local_tx,
            Lane::Remote => &self.remote_tx,
        };
        if let Err(mpsc::error::SendError(work)) = tx.send(work).await {
            work.session.finish_work();
            if work.message.expects_response() {
                work.session.finish_request(work.message.id);
            }
            return self.reject(session, &work.message, ProtocolError::ShuttingDown).await;
        }
        Ok(())
    }

    /// Answer a request that never reached a worker. Notifies are dropped.
    async fn reject(&self, session: &Session, message: &Message, err: ProtocolError) -> Result<()> {
        if message.expects_response() {
            debug!(route = %message.route, error = %err, "Rejecting request");
            self.respond(session, message.id, Err(err)).await;
        } else {
            debug!(route = %message.route, error = %err, "Dropping notify");
        }
        Ok(())
    }

    /// Run the local handler for `route`.
    ///
    /// Panics inside the handler are caught and reported as
    /// [`ProtocolError::HandlerPanic`]. Notify handlers yield an empty payload.
    pub async fn handle(&self, session: &Arc<Session>, route: &Route, message: &Message) -> Result<Vec<u8>> {
        let key = route.short();
        let handler = match self.registry.handler(&key) {
            Some(handler) => handler,
            None => {
                self.metrics.route_not_found();
                return Err(ProtocolError::RouteNotFound(key));
            }
        };
        let request = Request::new(message.data.clone(), self.options.serializer);
        guarded(handler.call(session.clone(), request)).await
    }

    async fn forward(&self, work: &Unhandled) -> Result<Vec<u8>> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| ProtocolError::RemoteError(constants::ERR_NO_REMOTE_SERVICE.into()))?;
        let context = work.session.context();
        guarded(remote.remote_process(&work.route, &context, &work.message))
            .await
            .map_err(|e| match e {
                ProtocolError::Handler { .. }
                | ProtocolError::RouteNotFound(_)
                | ProtocolError::RemoteError(_) => e,
                other => ProtocolError::RemoteError(other.to_string()),
            })
    }

    async fn execute(&self, lane: Lane, work: &Unhandled) {
        let timer = Timer::start(lane.as_str());
        let result = match lane {
            Lane::Local => {
                self.metrics.local_dispatch();
                self.handle(&work.session, &work.route, &work.message).await
            }
            Lane::Remote => {
                self.metrics.remote_dispatch();
                self.forward(work).await
            }
        };

        drop(timer);

        if let Err(e) = &result {
            match e {
                ProtocolError::HandlerPanic(_) => {
                    self.metrics.panic_recovered();
                    error!(route = %work.route, error = %e, "Handler panicked");
                }
                ProtocolError::RouteNotFound(_) => {
                    debug!(route = %work.route, "Route not found");
                }
                _ => {
                    self.metrics.handler_error();
                    debug!(route = %work.route, error = %e, "Handler returned an error");
                }
            }
        }

        if work.message.expects_response() {
            work.session.finish_request(work.message.id);
            self.respond(&work.session, work.message.id, result).await;
        }
        work.session.finish_work();
    }

    /// Answer queued work that will never run with `SHUTTING_DOWN`. Never
    /// waits on the session's outbound queue.
    fn abandon(&self, work: &Unhandled) {
        let message = &work.message;
        if message.expects_response() && work.session.finish_request(message.id) {
            let reply = Message::error_response(
                message.id,
                self.error_payload(&ProtocolError::ShuttingDown),
            );
            let packet = self
                .options
                .message_encoder
                .encode(&reply)
                .and_then(|body| self.options.encoder.encode_packet(PacketType::Data, &body));
            match packet.map(|packet| work.session.try_send(packet)) {
                Ok(Ok(true)) => self.metrics.response_sent(),
                Ok(Ok(false)) => {
                    debug!(session_id = work.session.id(), id = message.id, "Outbound full, shutdown reply dropped")
                }
                Ok(Err(_)) => {}
                Err(e) => warn!(id = message.id, error = %e, "Failed to encode shutdown reply"),
            }
        }
        work.session.finish_work();
    }

    /// Encode and queue the response to request `id`.
    async fn respond(&self, session: &Session, id: u64, result: Result<Vec<u8>>) {
        let message = match result {
            Ok(data) => Message::response(id, data),
            Err(e) => Message::error_response(id, self.error_payload(&e)),
        };
        match self.send_message(session, &message).await {
            Ok(()) => self.metrics.response_sent(),
            Err(ProtocolError::ConnectionClosed) => {
                debug!(session_id = session.id(), id, "Session closed before response")
            }
            Err(e) => warn!(session_id = session.id(), id, error = %e, "Failed to send response"),
        }
    }

    fn error_payload(&self, err: &ProtocolError) -> Vec<u8> {
        let payload = ErrorPayload::from(err);
        self.options
            .serializer
            .marshal(&payload)
            .unwrap_or_else(|_| payload.msg.into_bytes())
    }

    async fn send_message(&self, session: &Session, message: &Message) -> Result<()> {
        let body = self.options.message_encoder.encode(message)?;
        let packet = self.options.encoder.encode_packet(PacketType::Data, &body)?;
        session.send(packet).await
    }

    /// Local worker loop. Returns once the die signal has fired and the local
    /// queue is drained.
    pub async fn dispatch(self: Arc<Self>, worker: usize) {
        self.run_worker(Lane::Local, worker).await
    }

    /// Remote worker loop, same lifecycle as [`HandlerService::dispatch`].
    pub async fn dispatch_remote(self: Arc<Self>, worker: usize) {
        self.run_worker(Lane::Remote, worker).await
    }

    #[instrument(skip(self, lane), fields(lane = lane.as_str()))]
    async fn run_worker(&self, lane: Lane, worker: usize) {
        let queue = match lane {
            Lane::Local => &self.local_rx,
            Lane::Remote => &self.remote_rx,
        };
        let mut die = self.die.subscribe();
        debug!("Worker started");

        loop {
            let next = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = die.fired() => None,
                    work = rx.recv() => work,
                }
            };
            match next {
                Some(work) => self.execute(lane, &work).await,
                None => break,
            }
        }

        // Producers still waiting on a full queue now fail to send and reject
        // their own messages.
        queue.lock().await.close();

        let deadline = Instant::now() + self.options.drain_timeout;
        let mut drained = 0usize;
        let mut abandoned = 0usize;
        loop {
            let next = queue.lock().await.try_recv();
            let Ok(work) = next else { break };
            if Instant::now() >= deadline {
                self.abandon(&work);
                abandoned += 1;
                continue;
            }
            if timeout_at(deadline, self.execute(lane, &work)).await.is_err() {
                warn!(drained, "Drain timeout elapsed, refusing the rest of the queue");
                self.abandon(&work);
                abandoned += 1;
                continue;
            }
            drained += 1;
        }
        debug!(drained, abandoned, "Worker stopped");
    }

    /// Check options, run `after_init` hooks and spawn the worker pools and
    /// the heartbeat monitor.
    ///
    /// Invalid options are fatal: the die signal fires and the error is
    /// returned.
    pub fn start(self: &Arc<Self>) -> Result<DispatchHandle> {
        let problems = self.options.validate();
        if !problems.is_empty() {
            let err = ProtocolError::ConfigError(problems.join("; "));
            error!(error = %err, "Refusing to start dispatcher");
            self.die.fire();
            return Err(err);
        }

        self.registry.after_init_all();

        let mut tasks = Vec::with_capacity(self.options.workers * 2 + 1);
        for worker in 0..self.options.workers {
            tasks.push(tokio::spawn(self.clone().dispatch(worker)));
        }
        if self.remote.is_some() {
            for worker in 0..self.options.workers {
                tasks.push(tokio::spawn(self.clone().dispatch_remote(worker)));
            }
        }

        if self.options.heartbeat_timeout.is_zero() {
            warn!("Heartbeat timeout is zero, idle sessions will never be kicked");
        } else {
            let monitor = HeartbeatMonitor::new(
                self.pool.clone(),
                self.options.encoder.as_ref(),
                self.options.heartbeat_timeout,
                self.metrics.clone(),
            )?;
            tasks.push(tokio::spawn(monitor.run(self.die.subscribe())));
        }

        info!(
            server_id = %self.server.id,
            server_type = %self.server.server_type,
            workers = self.options.workers,
            handlers = self.registry.handler_count(),
            "Dispatcher started"
        );
        Ok(DispatchHandle { tasks })
    }

    /// Fire the die signal, wait for every task to drain, close the remaining
    /// sessions and run component shutdown hooks.
    pub async fn shutdown(&self, handle: DispatchHandle) {
        self.die.fire();
        for task in handle.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Dispatch task ended abnormally");
            }
        }
        for session in self.pool.snapshot() {
            self.close_session(&session);
        }
        self.registry.shutdown_all();
        self.metrics.log_metrics();
        info!("Dispatcher stopped");
    }

    /// Serve one client connection until it closes.
    ///
    /// Protocol violations end the connection; other errors are logged and
    /// the connection stays open.
    pub async fn handle_connection<S>(self: &Arc<Self>, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (session, mut outbound) = self.new_session();
        let session_id = session.id();
        let (reader, writer) = tokio::io::split(stream);
        let mut frames = FramedRead::new(reader, PacketBatches::new(self.options.decoder.clone()));
        let mut sink = FramedWrite::new(writer, PacketCodec::default());

        let mut writer_task = tokio::spawn(async move {
            while let Some(bytes) = outbound.recv().await {
                if let Err(e) = sink.send(bytes).await {
                    debug!(session_id, error = %e, "Write failed");
                    return;
                }
            }
            let _ = SinkExt::<Bytes>::close(&mut sink).await;
        });
        let mut writer_done = false;

        let result = loop {
            tokio::select! {
                _ = &mut writer_task, if !writer_done => {
                    writer_done = true;
                    break Ok(());
                }
                frame = frames.next() => match frame {
                    None => break Ok(()),
                    Some(Err(e)) => break Err(e),
                    Some(Ok(packets)) => {
                        if let Err(e) = self.process_batch(&session, packets).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.close_session(&session);
        if !writer_done {
            let _ = writer_task.await;
        }
        match &result {
            Ok(()) => debug!(session_id, "Connection closed"),
            Err(e) => warn!(session_id, error = %e, "Connection dropped"),
        }
        result
    }

    async fn process_batch(&self, session: &Arc<Session>, packets: Vec<Packet>) -> Result<()> {
        for packet in packets {
            match self.process_packet(session, packet).await {
                Ok(()) => {}
                Err(e) if e.is_protocol_violation() => return Err(e),
                Err(e) => warn!(session_id = session.id(), error = %e, "Packet rejected"),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerService")
            .field("server", &self.server)
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}
