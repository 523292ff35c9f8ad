//! The tunnel session state machine.
//!
//! One session per WebSocket. Messages are processed serially in the
//! order they arrive; the only concurrency inside a session is the
//! write pump and the keep-alive pump, both fed through the outbound
//! channel and stopped by the session's cancellation token.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use vantage_input::{
    DesktopSettings, Extent, InputSink, MouseButton, PointerEvent, RemoteInputLock,
    decode_legacy_key, decode_pointer, decode_unicode_key, map_coordinates,
};
use vantage_protocol::control::{
    self, ControlRequest, ListRequest, NegotiationText, RemoveRequest, UploadDoneRequest,
    UploadRequest, parse_control, parse_negotiation,
};
use vantage_protocol::desktop::{encode_display_size, parse_desktop_frame};
use vantage_protocol::{
    DesktopCommand, FrameClass, HELLO, HELLO_RECORDED, SESSION_IDLE_TIMEOUT, TunnelDescriptor,
    TunnelUsage, classify_frame,
};
use vantage_store::{DeleteOutcome, FileStore};

use crate::TunnelError;
use crate::download::stream_download;
use crate::hooks::{
    AUDIT_FILE_DELETE, AUDIT_UPLOAD_COMPLETE, AuditEvent, AuditSink, ConsentResolver, HostEvent,
    ProjectionHost,
};
use crate::pending::{PendingDeletion, PendingTable};
use crate::pumps::keepalive_pump;
use crate::upload::UploadState;

/// Collaborators injected into every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn FileStore>,
    pub input: Arc<dyn InputSink>,
    pub host: Arc<dyn ProjectionHost>,
    pub consent: Arc<dyn ConsentResolver>,
    pub audit: Arc<dyn AuditSink>,
    pub settings: Arc<DesktopSettings>,
    pub input_lock: Arc<RemoteInputLock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitHello,
    AwaitUsage,
    Active,
}

enum Flow {
    Continue,
    Closed,
}

/// Drives one tunnel session to completion.
///
/// `inbound` is the read half of the WebSocket (generic so tests can
/// feed scripted message sequences); outbound messages go through `out`
/// to the write pump. Host-side asynchronous outcomes (projection
/// ready, consent verdicts) arrive on `events_rx`; `events_tx` is
/// handed to the host callbacks that produce them.
pub async fn run_session<S>(
    mut inbound: S,
    out: mpsc::Sender<tungstenite::Message>,
    events_tx: mpsc::Sender<HostEvent>,
    mut events_rx: mpsc::Receiver<HostEvent>,
    descriptor: TunnelDescriptor,
    deps: SessionDeps,
    cancel: CancellationToken,
) -> Result<(), TunnelError>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let mut session = Session::new(out, events_tx, descriptor, deps, cancel.clone());

    let idle = tokio::time::sleep(SESSION_IDLE_TIMEOUT);
    tokio::pin!(idle);

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),

            () = &mut idle => {
                warn!("session idle timeout");
                break Ok(());
            }

            ev = events_rx.recv() => {
                if let Some(ev) = ev {
                    if let Err(e) = session.handle_host_event(ev).await {
                        break Err(e);
                    }
                }
            }

            msg = inbound.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        idle.as_mut().reset(
                            tokio::time::Instant::now() + SESSION_IDLE_TIMEOUT,
                        );
                        match session.handle_message(msg).await {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Closed) => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break Ok(());
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break Ok(());
                    }
                }
            }
        }
    };

    session.teardown();
    result
}

struct Session {
    out: mpsc::Sender<tungstenite::Message>,
    events_tx: mpsc::Sender<HostEvent>,
    descriptor: TunnelDescriptor,
    deps: SessionDeps,
    cancel: CancellationToken,
    phase: Phase,
    usage: Option<TunnelUsage>,
    options: Option<Value>,
    upload: Option<UploadState>,
    pending: PendingTable,
    last_listing: Option<Value>,
    /// Unscaled capture size, once known.
    capture: Option<(u16, u16)>,
    /// Capture-space display size advertised to the peer.
    remote_extent: Extent,
    /// Size of the injection surface.
    actual_extent: Extent,
}

impl Session {
    fn new(
        out: mpsc::Sender<tungstenite::Message>,
        events_tx: mpsc::Sender<HostEvent>,
        descriptor: TunnelDescriptor,
        deps: SessionDeps,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            out,
            events_tx,
            descriptor,
            deps,
            cancel,
            phase: Phase::AwaitHello,
            usage: None,
            options: None,
            upload: None,
            pending: PendingTable::default(),
            last_listing: None,
            capture: None,
            remote_extent: Extent::new(0, 0),
            actual_extent: Extent::new(0, 0),
        }
    }

    /// Unconditional teardown; safe to run exactly once per session but
    /// built from idempotent pieces.
    fn teardown(&mut self) {
        if let Some(upload) = self.upload.take() {
            debug!(name = %upload.name, written = upload.written(), "discarding incomplete upload");
        }
        self.cancel.cancel();
        info!("session closed");
    }

    async fn handle_message(&mut self, msg: tungstenite::Message) -> Result<Flow, TunnelError> {
        match msg {
            tungstenite::Message::Text(text) => self.handle_text(text.as_str()).await,
            tungstenite::Message::Binary(data) => {
                self.handle_binary(&data).await?;
                Ok(Flow::Continue)
            }
            tungstenite::Message::Ping(data) => {
                self.send(tungstenite::Message::Pong(data)).await?;
                Ok(Flow::Continue)
            }
            tungstenite::Message::Close(_) => {
                debug!("peer closed");
                Ok(Flow::Closed)
            }
            _ => Ok(Flow::Continue),
        }
    }

    async fn handle_text(&mut self, text: &str) -> Result<Flow, TunnelError> {
        match self.phase {
            Phase::AwaitHello => {
                if text == HELLO || text == HELLO_RECORDED {
                    debug!(recorded = (text == HELLO_RECORDED), "hello received");
                    self.phase = Phase::AwaitUsage;
                } else {
                    trace!("ignoring pre-hello text");
                }
                Ok(Flow::Continue)
            }
            Phase::AwaitUsage => match parse_negotiation(text) {
                NegotiationText::Options(options) => {
                    debug!("options retained");
                    self.options = Some(options);
                    Ok(Flow::Continue)
                }
                NegotiationText::OtherJson(_) => Ok(Flow::Continue),
                NegotiationText::Invalid => {
                    warn!("ignoring malformed negotiation text");
                    Ok(Flow::Continue)
                }
                NegotiationText::Usage(code) => self.negotiate(code).await,
            },
            Phase::Active => {
                // Text only matters during negotiation; control JSON
                // arrives as binary frames once the tunnel is active.
                trace!("ignoring text frame on active tunnel");
                Ok(Flow::Continue)
            }
        }
    }

    async fn negotiate(&mut self, code: i64) -> Result<Flow, TunnelError> {
        let usage = TunnelUsage::from_code(code).ok_or(TunnelError::BadUsageCode(code))?;
        if self.descriptor.usage != 0 && self.descriptor.usage != code {
            return Err(TunnelError::UsageMismatch {
                expected: self.descriptor.usage,
                declared: code,
            });
        }
        info!(?usage, "tunnel negotiated");
        self.phase = Phase::Active;
        self.usage = Some(usage);

        match usage {
            TunnelUsage::FileTransfer => {
                let locator = self
                    .options
                    .as_ref()
                    .and_then(|o| o.get("file"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or(TunnelError::MissingFile)?;
                stream_download(
                    self.deps.store.as_ref(),
                    &locator,
                    &self.out,
                    self.deps.audit.as_ref(),
                    self.descriptor.session_user(),
                )
                .await?;
                Ok(Flow::Closed)
            }
            TunnelUsage::Desktop => {
                self.spawn_keepalive();
                self.bootstrap_projection().await?;
                Ok(Flow::Continue)
            }
            TunnelUsage::FileBrowse => {
                self.spawn_keepalive();
                Ok(Flow::Continue)
            }
        }
    }

    fn spawn_keepalive(&self) {
        tokio::spawn(keepalive_pump(self.out.clone(), self.cancel.clone()));
    }

    async fn bootstrap_projection(&mut self) -> Result<(), TunnelError> {
        if let Some((width, height)) = self.deps.host.capture_size() {
            self.advertise_display(width, height).await
        } else {
            let waiting = control::console_message(Some("Waiting for display permission..."), 1);
            self.send_json(&control::ctrl_response(&waiting)).await?;
            self.deps.host.start_projection(self.events_tx.clone());
            Ok(())
        }
    }

    async fn advertise_display(&mut self, width: u16, height: u16) -> Result<(), TunnelError> {
        self.capture = Some((width, height));
        self.remote_extent = Extent::new(i32::from(width), i32::from(height));
        let (aw, ah) = self.deps.host.display_size().unwrap_or((width, height));
        self.actual_extent = Extent::new(i32::from(aw), i32::from(ah));

        let (sw, sh) = self.deps.settings.scaled_size(width, height);
        debug!(width = sw, height = sh, "advertising display size");
        self.send(tungstenite::Message::Binary(
            encode_display_size(sw, sh).to_vec().into(),
        ))
        .await
    }

    async fn handle_host_event(&mut self, event: HostEvent) -> Result<(), TunnelError> {
        match event {
            HostEvent::ProjectionReady { width, height } => {
                let clear = control::console_message(None, 0);
                self.send_json(&control::ctrl_response(&clear)).await?;
                self.advertise_display(width, height).await
            }
            HostEvent::ConsentResolved { id, approved } => {
                self.resolve_pending(id, approved).await
            }
        }
    }

    async fn handle_binary(&mut self, frame: &[u8]) -> Result<(), TunnelError> {
        if self.phase != Phase::Active {
            trace!("dropping binary frame before negotiation");
            return Ok(());
        }
        match classify_frame(frame, self.upload.is_some()) {
            None => {
                trace!(len = frame.len(), "dropping short frame");
                Ok(())
            }
            Some(FrameClass::Control(bytes)) => self.handle_control(bytes).await,
            Some(FrameClass::UploadData(bytes)) => self.handle_upload_data(bytes).await,
            Some(FrameClass::Command(bytes)) => self.handle_command(bytes).await,
        }
    }

    // Control channel -----------------------------------------------------

    async fn handle_control(&mut self, bytes: &[u8]) -> Result<(), TunnelError> {
        let (request, raw) = match parse_control(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("dropping unparseable control frame: {e}");
                return Ok(());
            }
        };
        match request {
            ControlRequest::Ls(req) => self.handle_list(req, raw).await,
            ControlRequest::Rm(req) => self.handle_remove(req).await,
            ControlRequest::Upload(req) => self.handle_upload_open(req).await,
            ControlRequest::UploadDone(req) => self.handle_upload_done(req).await,
        }
    }

    async fn handle_list(&mut self, req: ListRequest, raw: Value) -> Result<(), TunnelError> {
        let entries = match self.deps.store.list_category(&req.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %req.path, "listing failed: {e}");
                Vec::new()
            }
        };
        self.last_listing = Some(raw.clone());
        self.send_json(&control::listing_response(&raw, &entries))
            .await
    }

    async fn handle_remove(&mut self, req: RemoveRequest) -> Result<(), TunnelError> {
        let mut any_deleted = false;
        for file in &req.delfiles {
            let locator = join_locator(&req.path, file);
            match self.deps.store.delete(&locator) {
                Ok(DeleteOutcome::Deleted) => {
                    any_deleted = true;
                    self.audit_delete(&locator);
                    self.send_json(&control::remove_response(&req.reqid, true))
                        .await?;
                }
                Ok(DeleteOutcome::NotFound) => {
                    self.send_json(&control::remove_response(&req.reqid, false))
                        .await?;
                }
                Ok(DeleteOutcome::NeedsConsent(ticket)) => {
                    debug!(%locator, id = %ticket.id, "deletion parked on consent");
                    self.pending.insert(
                        ticket.id,
                        PendingDeletion {
                            locator,
                            reqid: req.reqid.clone(),
                        },
                    );
                    self.deps.consent.resolve(&ticket, self.events_tx.clone());
                }
                Err(e) => {
                    warn!(%locator, "delete failed: {e}");
                    self.send_json(&control::remove_response(&req.reqid, false))
                        .await?;
                }
            }
        }
        if any_deleted {
            self.refresh_listing().await?;
        }
        Ok(())
    }

    async fn resolve_pending(&mut self, id: uuid::Uuid, approved: bool) -> Result<(), TunnelError> {
        let Some(parked) = self.pending.take(id) else {
            debug!(%id, "consent verdict for unknown deletion");
            return Ok(());
        };
        if !approved {
            info!(locator = %parked.locator, "deletion denied by user");
            return self
                .send_json(&control::remove_response(&parked.reqid, false))
                .await;
        }
        match self.deps.store.delete(&parked.locator) {
            Ok(DeleteOutcome::Deleted) => {
                self.audit_delete(&parked.locator);
                self.send_json(&control::remove_response(&parked.reqid, true))
                    .await?;
                self.refresh_listing().await
            }
            other => {
                warn!(locator = %parked.locator, ?other, "deletion failed after consent");
                self.send_json(&control::remove_response(&parked.reqid, false))
                    .await
            }
        }
    }

    /// Re-executes the last listing request and pushes it as an update.
    async fn refresh_listing(&mut self) -> Result<(), TunnelError> {
        let Some(raw) = self.last_listing.clone() else {
            return Ok(());
        };
        let path = raw.get("path").and_then(Value::as_str).unwrap_or("");
        let entries = self.deps.store.list_category(path).unwrap_or_default();
        self.send_json(&control::listing_response(&raw, &entries))
            .await
    }

    fn audit_delete(&self, locator: &str) {
        let name = locator.rsplit('/').next().unwrap_or(locator);
        self.deps.audit.log_event(AuditEvent {
            code: AUDIT_FILE_DELETE,
            session_user: self.descriptor.session_user(),
            file_name: name.to_owned(),
            size: 0,
        });
    }

    // Upload substream -----------------------------------------------------

    async fn handle_upload_open(&mut self, req: UploadRequest) -> Result<(), TunnelError> {
        if let Some(previous) = self.upload.take() {
            debug!(name = %previous.name, "discarding superseded upload");
        }
        match UploadState::open(self.deps.store.as_ref(), &req.path, &req.name, req.reqid.clone()) {
            Ok(upload) => {
                info!(name = %req.name, "upload opened");
                self.upload = Some(upload);
                self.send_json(&control::upload_start(&req.reqid)).await
            }
            Err(e) => {
                warn!(name = %req.name, "upload open failed: {e}");
                self.send_json(&control::upload_error(&req.reqid)).await
            }
        }
    }

    async fn handle_upload_data(&mut self, frame: &[u8]) -> Result<(), TunnelError> {
        let Some(upload) = self.upload.as_mut() else {
            return Ok(());
        };
        match upload.write_frame(frame) {
            Ok(()) => {
                let reqid = upload.reqid.clone();
                self.send_json(&control::upload_ack(&reqid)).await
            }
            Err(e) => {
                let reqid = upload.reqid.clone();
                warn!("upload write failed: {e}");
                self.upload = None;
                self.send_json(&control::upload_error(&reqid)).await
            }
        }
    }

    async fn handle_upload_done(&mut self, req: UploadDoneRequest) -> Result<(), TunnelError> {
        let Some(upload) = self.upload.take() else {
            debug!("uploaddone without an open upload");
            return Ok(());
        };
        let reqid = if req.reqid.is_null() {
            upload.reqid.clone()
        } else {
            req.reqid
        };
        let name = upload.name.clone();
        match upload.finish() {
            Ok(total) => {
                info!(%name, total, "upload complete");
                self.deps.audit.log_event(AuditEvent {
                    code: AUDIT_UPLOAD_COMPLETE,
                    session_user: self.descriptor.session_user(),
                    file_name: name,
                    size: total,
                });
                self.send_json(&control::upload_done(&reqid)).await
            }
            Err(e) => {
                warn!(%name, "upload finalize failed: {e}");
                self.send_json(&control::upload_error(&reqid)).await
            }
        }
    }

    // Desktop commands -----------------------------------------------------

    async fn handle_command(&mut self, frame: &[u8]) -> Result<(), TunnelError> {
        let command = match parse_desktop_frame(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("dropping malformed command frame: {e}");
                return Ok(());
            }
        };
        match command {
            DesktopCommand::LegacyKey { flag, code } => {
                if let Some((action, press)) = decode_legacy_key(flag, code) {
                    if !self.deps.input_lock.locked() {
                        self.deps.input.inject_key(action, press);
                    }
                } else {
                    trace!(flag, code, "unmapped legacy key");
                }
            }
            DesktopCommand::UnicodeKey { flag, code_unit } => {
                if let Some((action, press)) = decode_unicode_key(flag, code_unit) {
                    if !self.deps.input_lock.locked() {
                        self.deps.input.inject_key(action, press);
                    }
                } else {
                    trace!(code_unit, "unmapped unicode key");
                }
            }
            DesktopCommand::Mouse(mouse) => self.handle_pointer(&mouse),
            DesktopCommand::Settings(settings) => {
                debug!(?settings, "settings updated");
                self.deps.settings.apply(&settings);
                // The peer sizes its viewer from the advertised display
                // size, so a scaling change re-advertises it.
                if let Some((width, height)) = self.capture {
                    self.advertise_display(width, height).await?;
                }
            }
            DesktopCommand::Refresh | DesktopCommand::Pause => {
                trace!("reserved command, ignored");
            }
            DesktopCommand::InputLock { locked } => {
                info!(locked, "remote input lock");
                self.deps.input_lock.set(locked);
                self.deps.input.set_remote_input_locked(locked);
            }
        }
        Ok(())
    }

    fn handle_pointer(&self, mouse: &vantage_protocol::MouseFrame) {
        if self.deps.input_lock.locked() {
            return;
        }
        let event = decode_pointer(mouse);
        let (wx, wy) = match event {
            PointerEvent::Move { x, y }
            | PointerEvent::Down { x, y, .. }
            | PointerEvent::Up { x, y, .. }
            | PointerEvent::DoubleClick { x, y }
            | PointerEvent::Scroll { x, y, .. } => (x, y),
        };
        let (x, y) = map_coordinates(
            i32::from(wx),
            i32::from(wy),
            self.deps.settings.scaling_level(),
            self.remote_extent,
            self.actual_extent,
        );

        let input = &self.deps.input;
        match event {
            PointerEvent::Move { .. } => input.inject_mouse_move(x, y),
            PointerEvent::Down { button, .. } => input.inject_mouse_down(x, y, button),
            PointerEvent::Up { button, .. } => input.inject_mouse_up(x, y, button),
            PointerEvent::DoubleClick { .. } => {
                // Peers expect four discrete events.
                input.inject_mouse_down(x, y, MouseButton::Left);
                input.inject_mouse_up(x, y, MouseButton::Left);
                input.inject_mouse_down(x, y, MouseButton::Left);
                input.inject_mouse_up(x, y, MouseButton::Left);
            }
            PointerEvent::Scroll { delta, .. } => input.inject_mouse_scroll(x, y, delta),
        }
    }

    // Plumbing -------------------------------------------------------------

    async fn send(&self, msg: tungstenite::Message) -> Result<(), TunnelError> {
        self.out.send(msg).await.map_err(|_| TunnelError::OutboundClosed)
    }

    async fn send_json(&self, value: &Value) -> Result<(), TunnelError> {
        self.send(tungstenite::Message::Text(value.to_string().into()))
            .await
    }
}

fn join_locator(path: &str, file: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        file.to_owned()
    } else {
        format!("{trimmed}/{file}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::io::{Read, Write};
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::stream;
    use serde_json::json;
    use vantage_protocol::ListingEntry;
    use vantage_protocol::desktop::{
        OP_INPUT_LOCK, OP_KEY_LEGACY, OP_MOUSE, OP_SETTINGS, OP_KEY_UNICODE,
    };
    use vantage_store::{ConsentTicket, FileInfo, StoreError};

    type WsResult = Result<tungstenite::Message, tungstenite::Error>;

    // -- mocks ------------------------------------------------------------

    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestStore {
        files: Mutex<HashMap<String, Vec<u8>>>,
        upload_buf: Arc<Mutex<Vec<u8>>>,
        fail_open: bool,
        /// Locators whose first delete attempt demands consent.
        consent_required: Mutex<HashSet<String>>,
    }

    impl FileStore for TestStore {
        fn list_category(&self, path: &str) -> Result<Vec<ListingEntry>, StoreError> {
            let prefix = format!("{}/", path.trim_matches('/'));
            let files = self.files.lock().unwrap();
            let mut entries: Vec<_> = files
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix(&prefix)
                        .map(|name| ListingEntry::file(name, v.len() as u64, 0))
                })
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        }

        fn open_for_write(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Box<dyn Write + Send + Sync>, StoreError> {
            if self.fail_open {
                return Err(StoreError::Io(std::io::Error::other("denied")));
            }
            Ok(Box::new(SharedSink(self.upload_buf.clone())))
        }

        fn open_for_read(
            &self,
            locator: &str,
        ) -> Result<(Box<dyn Read + Send>, FileInfo), StoreError> {
            let files = self.files.lock().unwrap();
            let data = files
                .get(locator)
                .ok_or_else(|| StoreError::NotFound(locator.to_owned()))?;
            Ok((
                Box::new(std::io::Cursor::new(data.clone())),
                FileInfo {
                    name: locator.rsplit('/').next().unwrap_or(locator).to_owned(),
                    size: data.len() as u64,
                },
            ))
        }

        fn delete(&self, locator: &str) -> Result<DeleteOutcome, StoreError> {
            if self.consent_required.lock().unwrap().remove(locator) {
                return Ok(DeleteOutcome::NeedsConsent(ConsentTicket::new(locator)));
            }
            if self.files.lock().unwrap().remove(locator).is_some() {
                Ok(DeleteOutcome::Deleted)
            } else {
                Ok(DeleteOutcome::NotFound)
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl InputSink for RecordingSink {
        fn inject_key(&self, action: vantage_input::KeyAction, press: vantage_input::KeyPress) {
            self.0
                .lock()
                .unwrap()
                .push(format!("key {action:?} {:?}", press.key));
        }
        fn inject_mouse_move(&self, x: i32, y: i32) {
            self.0.lock().unwrap().push(format!("move {x} {y}"));
        }
        fn inject_mouse_down(&self, x: i32, y: i32, button: MouseButton) {
            self.0.lock().unwrap().push(format!("down {button:?} {x} {y}"));
        }
        fn inject_mouse_up(&self, x: i32, y: i32, button: MouseButton) {
            self.0.lock().unwrap().push(format!("up {button:?} {x} {y}"));
        }
        fn inject_mouse_scroll(&self, x: i32, y: i32, delta: i16) {
            self.0.lock().unwrap().push(format!("scroll {delta} {x} {y}"));
        }
        fn set_remote_input_locked(&self, locked: bool) {
            self.0.lock().unwrap().push(format!("locked {locked}"));
        }
    }

    struct FixedHost(Option<(u16, u16)>);

    impl ProjectionHost for FixedHost {
        fn capture_size(&self) -> Option<(u16, u16)> {
            self.0
        }
        fn start_projection(&self, _notify: crate::hooks::HostEventSender) {}
    }

    struct ApproveAll;

    impl ConsentResolver for ApproveAll {
        fn resolve(&self, ticket: &ConsentTicket, reply: crate::hooks::HostEventSender) {
            let _ = reply.try_send(HostEvent::ConsentResolved {
                id: ticket.id,
                approved: true,
            });
        }
    }

    struct DenyAll;

    impl ConsentResolver for DenyAll {
        fn resolve(&self, ticket: &ConsentTicket, reply: crate::hooks::HostEventSender) {
            let _ = reply.try_send(HostEvent::ConsentResolved {
                id: ticket.id,
                approved: false,
            });
        }
    }

    #[derive(Default)]
    struct RecordingAudit(Mutex<Vec<AuditEvent>>);

    impl AuditSink for RecordingAudit {
        fn log_event(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        store: Arc<TestStore>,
        sink: Arc<RecordingSink>,
        audit: Arc<RecordingAudit>,
        settings: Arc<DesktopSettings>,
        deps: SessionDeps,
    }

    fn fixture_with(store: TestStore, capture: Option<(u16, u16)>) -> Fixture {
        fixture_full(store, capture, Arc::new(ApproveAll))
    }

    fn fixture_full(
        store: TestStore,
        capture: Option<(u16, u16)>,
        consent: Arc<dyn ConsentResolver>,
    ) -> Fixture {
        let store = Arc::new(store);
        let sink = Arc::new(RecordingSink::default());
        let audit = Arc::new(RecordingAudit::default());
        let settings = Arc::new(DesktopSettings::default());
        let deps = SessionDeps {
            store: store.clone(),
            input: sink.clone(),
            host: Arc::new(FixedHost(capture)),
            consent,
            audit: audit.clone(),
            settings: settings.clone(),
            input_lock: Arc::new(RemoteInputLock::default()),
        };
        Fixture {
            store,
            sink,
            audit,
            settings,
            deps,
        }
    }

    fn descriptor(expected_usage: i64) -> TunnelDescriptor {
        serde_json::from_value(json!({
            "usage": expected_usage,
            "userid": "user//srv//alice",
        }))
        .unwrap()
    }

    fn text(s: &str) -> WsResult {
        Ok(tungstenite::Message::Text(s.into()))
    }

    fn bin(b: Vec<u8>) -> WsResult {
        Ok(tungstenite::Message::Binary(b.into()))
    }

    fn cmd(opcode: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = opcode.to_be_bytes().to_vec();
        frame.extend(((payload.len() + 4) as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Runs a scripted session to completion and collects its output.
    async fn run(
        messages: Vec<WsResult>,
        descriptor: TunnelDescriptor,
        deps: SessionDeps,
    ) -> (Result<(), TunnelError>, Vec<tungstenite::Message>) {
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let result = run_session(
            stream::iter(messages),
            out_tx,
            ev_tx,
            ev_rx,
            descriptor,
            deps,
            CancellationToken::new(),
        )
        .await;

        let mut sent = Vec::new();
        while let Some(msg) = out_rx.recv().await {
            sent.push(msg);
        }
        (result, sent)
    }

    fn texts(sent: &[tungstenite::Message]) -> Vec<Value> {
        sent.iter()
            .filter_map(|m| match m {
                tungstenite::Message::Text(t) => serde_json::from_str(t.as_str()).ok(),
                _ => None,
            })
            .collect()
    }

    // -- negotiation ------------------------------------------------------

    #[tokio::test]
    async fn bad_usage_code_stops_the_session() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, _) = run(vec![text("c"), text("7")], descriptor(0), fx.deps).await;
        assert!(matches!(result, Err(TunnelError::BadUsageCode(7))));
    }

    #[tokio::test]
    async fn usage_mismatch_stops_the_session() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, _) = run(vec![text("c"), text("10")], descriptor(2), fx.deps).await;
        assert!(matches!(
            result,
            Err(TunnelError::UsageMismatch { expected: 2, declared: 10 })
        ));
    }

    #[tokio::test]
    async fn pre_hello_text_is_ignored() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let (result, sent) = run(
            vec![text("noise"), text("c"), text("2")],
            descriptor(2),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert!(!sent.is_empty(), "display size still advertised");
    }

    #[tokio::test]
    async fn desktop_negotiation_advertises_display_size() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let (result, sent) = run(vec![text("c"), text("2")], descriptor(0), fx.deps).await;
        assert!(result.is_ok());

        let frame = sent
            .iter()
            .find_map(|m| match m {
                tungstenite::Message::Binary(b) => Some(b.to_vec()),
                _ => None,
            })
            .expect("display-size frame");
        assert_eq!(frame, encode_display_size(1080, 2400).to_vec());
    }

    #[tokio::test]
    async fn desktop_without_capture_reports_waiting() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, sent) = run(vec![text("c"), text("2")], descriptor(0), fx.deps).await;
        assert!(result.is_ok());

        let msgs = texts(&sent);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["ctrlChannel"], "102938");
        assert_eq!(msgs[0]["type"], "console");
        assert_eq!(msgs[0]["msgid"], 1);
    }

    // -- desktop commands -------------------------------------------------

    #[tokio::test]
    async fn mouse_and_key_commands_reach_the_sink() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let sink = fx.sink.clone();
        let (result, _) = run(
            vec![
                text("c"),
                text("2"),
                // Move to (100, 200).
                bin(cmd(OP_MOUSE, &[0, 0, 0, 100, 0, 200])),
                // Left down / up at the same spot.
                bin(cmd(OP_MOUSE, &[0, 2, 0, 100, 0, 200])),
                bin(cmd(OP_MOUSE, &[0, 4, 0, 100, 0, 200])),
                // 'a' down via the legacy table.
                bin(cmd(OP_KEY_LEGACY, &[0, 65])),
                // 'A' down via the unicode table.
                bin(cmd(OP_KEY_UNICODE, &[0, 0, 65])),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(
            sink.events(),
            vec![
                "move 100 200",
                "down Left 100 200",
                "up Left 100 200",
                "key Down Letter('a')",
                "key Down Letter('a')",
            ]
        );
    }

    #[tokio::test]
    async fn double_click_expands_to_four_events() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let sink = fx.sink.clone();
        let (result, _) = run(
            vec![
                text("c"),
                text("2"),
                bin(cmd(OP_MOUSE, &[0, 136, 0, 50, 0, 60])),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(
            sink.events(),
            vec![
                "down Left 50 60",
                "up Left 50 60",
                "down Left 50 60",
                "up Left 50 60",
            ]
        );
    }

    #[tokio::test]
    async fn input_lock_suppresses_injection_until_unlocked() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let sink = fx.sink.clone();
        let (result, _) = run(
            vec![
                text("c"),
                text("2"),
                bin(cmd(OP_INPUT_LOCK, &[0, 0, 0, 0, 1])),
                bin(cmd(OP_KEY_LEGACY, &[0, 65])),
                bin(cmd(OP_MOUSE, &[0, 2, 0, 10, 0, 10])),
                bin(cmd(OP_INPUT_LOCK, &[0, 0, 0, 0, 0])),
                bin(cmd(OP_KEY_LEGACY, &[0, 66])),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(
            sink.events(),
            vec!["locked true", "locked false", "key Down Letter('b')"]
        );
    }

    #[tokio::test]
    async fn settings_command_updates_and_readvertises() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let settings = fx.settings.clone();
        let (result, sent) = run(
            vec![
                text("c"),
                text("2"),
                bin(cmd(OP_SETTINGS, &[2, 80, 2, 0])),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(settings.image_kind(), 2);
        assert_eq!(settings.compression(), 80);
        assert_eq!(settings.scaling_level(), 512);

        // Display size is re-sent with the new scaling applied.
        let frames: Vec<Vec<u8>> = sent
            .iter()
            .filter_map(|m| match m {
                tungstenite::Message::Binary(b) => Some(b.to_vec()),
                _ => None,
            })
            .collect();
        assert_eq!(
            frames,
            vec![
                encode_display_size(1080, 2400).to_vec(),
                encode_display_size(540, 1200).to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_command_frames_are_dropped_not_fatal() {
        let fx = fixture_with(TestStore::default(), Some((1080, 2400)));
        let sink = fx.sink.clone();
        let mut mismatched = cmd(OP_MOUSE, &[0, 0, 0, 100, 0, 200]);
        mismatched[3] = 99; // Declared length disagrees with actual.
        let (result, _) = run(
            vec![
                text("c"),
                text("2"),
                bin(mismatched),
                bin(cmd(OP_MOUSE, &[0, 0, 0, 5, 0, 6])),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok(), "session survives the bad frame");
        assert_eq!(sink.events(), vec!["move 5 6"]);
    }

    // -- file browse ------------------------------------------------------

    #[tokio::test]
    async fn listing_then_delete_refreshes_and_audits() {
        let store = TestStore::default();
        store
            .files
            .lock()
            .unwrap()
            .insert("Images/cat.jpg".into(), vec![1; 10]);
        let fx = fixture_with(store, None);
        let audit = fx.audit.clone();

        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                bin(br#"{"action":"ls","path":"Images","reqid":1}"#.to_vec()),
                bin(br#"{"action":"rm","path":"Images","delfiles":["cat.jpg"],"reqid":2}"#.to_vec()),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());

        let msgs = texts(&sent);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["action"], "ls");
        assert_eq!(msgs[0]["dir"][0]["n"], "cat.jpg");
        assert_eq!(msgs[1]["action"], "rm");
        assert_eq!(msgs[1]["success"], true);
        // Refresh of the earlier listing, now empty.
        assert_eq!(msgs[2]["action"], "ls");
        assert_eq!(msgs[2]["dir"], json!([]));

        let events = audit.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, AUDIT_FILE_DELETE);
        assert_eq!(events[0].file_name, "cat.jpg");
        assert_eq!(events[0].session_user.as_deref(), Some("user//srv//alice"));
    }

    #[tokio::test]
    async fn active_phase_text_is_ignored() {
        let store = TestStore::default();
        store
            .files
            .lock()
            .unwrap()
            .insert("Images/cat.jpg".into(), vec![1; 10]);
        let fx = fixture_with(store, None);
        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                // Same shape as a control frame, but as text.
                text(r#"{"action":"ls","path":"Images","reqid":1}"#),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert!(sent.is_empty(), "no listing for a text frame");
    }

    #[tokio::test]
    async fn delete_missing_file_reports_failure() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                bin(br#"{"action":"rm","path":"Images","delfiles":["nope.jpg"],"reqid":9}"#.to_vec()),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        let msgs = texts(&sent);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["action"], "rm");
        assert_eq!(msgs[0]["success"], false);
    }

    async fn run_consent_case(
        consent: Arc<dyn ConsentResolver>,
        expect_success: bool,
        expect_audit: usize,
    ) {
        let store = TestStore::default();
        store
            .files
            .lock()
            .unwrap()
            .insert("Images/cat.jpg".into(), vec![1; 10]);
        store
            .consent_required
            .lock()
            .unwrap()
            .insert("Images/cat.jpg".into());
        let fx = fixture_full(store, None, consent);
        let audit = fx.audit.clone();

        let messages = stream::iter(vec![
            text("c"),
            text("5"),
            bin(br#"{"action":"rm","path":"Images","delfiles":["cat.jpg"],"reqid":3}"#.to_vec()),
        ])
        .chain(stream::pending());

        let (out_tx, mut out_rx) = mpsc::channel(64);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            Box::pin(messages),
            out_tx,
            ev_tx,
            ev_rx,
            descriptor(0),
            fx.deps,
            cancel.clone(),
        ));

        let response = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .expect("rm response after consent")
            .unwrap();
        let msg: Value = match response {
            tungstenite::Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
            other => panic!("expected text response, got {other:?}"),
        };
        assert_eq!(msg["action"], "rm");
        assert_eq!(msg["reqid"], 3);
        assert_eq!(msg["success"], expect_success);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(audit.0.lock().unwrap().len(), expect_audit);
    }

    #[tokio::test]
    async fn consented_delete_is_parked_then_completed() {
        run_consent_case(Arc::new(ApproveAll), true, 1).await;
    }

    #[tokio::test]
    async fn denied_delete_reports_failure() {
        run_consent_case(Arc::new(DenyAll), false, 0).await;
    }

    // -- upload -----------------------------------------------------------

    #[tokio::test]
    async fn upload_three_escaped_frames_acked_and_audited() {
        let fx = fixture_with(TestStore::default(), None);
        let buf = fx.store.upload_buf.clone();
        let audit = fx.audit.clone();

        let mut payload = vec![0u8];
        payload.extend_from_slice(&[9u8; 1000]);

        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                bin(br#"{"action":"upload","path":"Images","name":"cat.jpg","reqid":4}"#.to_vec()),
                bin(payload.clone()),
                bin(payload.clone()),
                bin(payload),
                bin(br#"{"action":"uploaddone","reqid":4}"#.to_vec()),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());

        let actions: Vec<String> = texts(&sent)
            .iter()
            .map(|m| m["action"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            actions,
            vec!["uploadstart", "uploadack", "uploadack", "uploadack", "uploaddone"]
        );
        assert_eq!(buf.lock().unwrap().len(), 3000);

        let events = audit.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, AUDIT_UPLOAD_COMPLETE);
        assert_eq!(events[0].file_name, "cat.jpg");
        assert_eq!(events[0].size, 3000);
    }

    #[tokio::test]
    async fn upload_open_failure_reports_uploaderror() {
        let store = TestStore {
            fail_open: true,
            ..TestStore::default()
        };
        let fx = fixture_with(store, None);
        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                bin(br#"{"action":"upload","path":"Images","name":"cat.jpg","reqid":8}"#.to_vec()),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok(), "storage failure does not kill the session");
        let msgs = texts(&sent);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["action"], "uploaderror");
        assert_eq!(msgs[0]["reqid"], 8);
    }

    #[tokio::test]
    async fn new_upload_silently_replaces_open_one() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, sent) = run(
            vec![
                text("c"),
                text("5"),
                bin(br#"{"action":"upload","path":"Images","name":"one.jpg","reqid":1}"#.to_vec()),
                bin(br#"{"action":"upload","path":"Images","name":"two.jpg","reqid":2}"#.to_vec()),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        let actions: Vec<String> = texts(&sent)
            .iter()
            .map(|m| m["action"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(actions, vec!["uploadstart", "uploadstart"]);
    }

    // -- file transfer ----------------------------------------------------

    #[tokio::test]
    async fn file_transfer_streams_the_negotiated_file() {
        let store = TestStore::default();
        store
            .files
            .lock()
            .unwrap()
            .insert("Sdcard/report.txt".into(), vec![3u8; 500]);
        let fx = fixture_with(store, None);
        let audit = fx.audit.clone();

        let (result, sent) = run(
            vec![
                text("c"),
                text(r#"{"type":"options","file":"Sdcard/report.txt"}"#),
                text("10"),
            ],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());

        let data: Vec<u8> = sent
            .iter()
            .filter_map(|m| match m {
                tungstenite::Message::Binary(b) => Some(b.to_vec()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(data, vec![3u8; 500]);

        let events = audit.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, crate::hooks::AUDIT_DOWNLOAD_START);
    }

    #[tokio::test]
    async fn file_transfer_without_file_option_stops() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, _) = run(
            vec![text("c"), text(r#"{"type":"options"}"#), text("10")],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(matches!(result, Err(TunnelError::MissingFile)));
    }

    // -- transport niceties -----------------------------------------------

    #[tokio::test]
    async fn peer_ping_gets_a_pong() {
        let fx = fixture_with(TestStore::default(), None);
        let (result, sent) = run(
            vec![Ok(tungstenite::Message::Ping(vec![1, 2].into()))],
            descriptor(0),
            fx.deps,
        )
        .await;
        assert!(result.is_ok());
        assert!(matches!(
            &sent[0],
            tungstenite::Message::Pong(data) if data.as_ref() == [1, 2]
        ));
    }

    #[tokio::test]
    async fn peer_close_ends_the_session() {
        let fx = fixture_with(TestStore::default(), Some((100, 100)));
        let (result, _) = run(
            vec![
                text("c"),
                text("2"),
                Ok(tungstenite::Message::Close(None)),
                // Never reached.
                bin(cmd(OP_KEY_LEGACY, &[0, 65])),
            ],
            descriptor(0),
            fx.deps.clone(),
        )
        .await;
        assert!(result.is_ok());
        assert!(fx.sink.events().is_empty());
    }
}
