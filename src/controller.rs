use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::analysis;
use crate::chat::{self, ChatTurn, Transcript, TurnHandle, CHAT_FAILURE};
use crate::data::UNKNOWN_REGION;
use crate::economy::{self, CountryRecord};
use crate::gemini::{ChatRequest, GenerationError, GenerativeService};

/// Properties of a clicked polygon
#[derive(Debug, Clone, PartialEq)]
pub struct RegionClick {
    pub iso_code: String,
    pub display_name: String,
    pub centroid_lat: f64,
    pub centroid_lng: f64,
}

/// Identity of one selection. Bumped on every select and deselect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEpoch(u64);

/// The region shown in the detail panel
#[derive(Debug, Clone)]
pub struct SelectedRegion {
    /// Table name when known, else the boundary name, else a generic label
    pub region_name: String,
    pub iso_code: String,
    pub record: Option<&'static CountryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisText {
    Empty,
    Loading,
    Ready(String),
}

impl AnalysisText {
    /// Text usable as chat context ("" unless ready)
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready(text) => text,
            Self::Empty | Self::Loading => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No panel, or panel ready for chat
    Idle,
    AnalysisPending,
}

/// Completion reports from background tasks
#[derive(Debug)]
pub enum ControllerEvent {
    AnalysisReady {
        epoch: SelectionEpoch,
        text: String,
    },
    ChatFragment {
        epoch: SelectionEpoch,
        turn: TurnHandle,
        text: String,
    },
    ChatFinished {
        epoch: SelectionEpoch,
        turn: TurnHandle,
    },
    ChatFailed {
        epoch: SelectionEpoch,
        turn: TurnHandle,
    },
}

impl ControllerEvent {
    fn epoch(&self) -> SelectionEpoch {
        match self {
            Self::AnalysisReady { epoch, .. }
            | Self::ChatFragment { epoch, .. }
            | Self::ChatFinished { epoch, .. }
            | Self::ChatFailed { epoch, .. } => *epoch,
        }
    }
}

pub struct Controller {
    service: Arc<dyn GenerativeService>,
    runtime: Handle,
    events_tx: flume::Sender<ControllerEvent>,
    events_rx: flume::Receiver<ControllerEvent>,
    request_timeout: Duration,
    epoch: SelectionEpoch,
    selected: Option<SelectedRegion>,
    analysis: AnalysisText,
    transcript: Transcript,
    /// Assistant turn currently receiving fragments
    streaming: Option<TurnHandle>,
}

impl Controller {
    pub fn new(service: Arc<dyn GenerativeService>, runtime: Handle, request_timeout: Duration) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            service,
            runtime,
            events_tx,
            events_rx,
            request_timeout,
            epoch: SelectionEpoch(0),
            selected: None,
            analysis: AnalysisText::Empty,
            transcript: Transcript::default(),
            streaming: None,
        }
    }

    pub fn selected(&self) -> Option<&SelectedRegion> {
        self.selected.as_ref()
    }

    pub fn analysis(&self) -> &AnalysisText {
        &self.analysis
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn phase(&self) -> Phase {
        match (&self.selected, &self.analysis) {
            (Some(_), AnalysisText::Loading) => Phase::AnalysisPending,
            _ => Phase::Idle,
        }
    }

    fn next_epoch(&mut self) -> SelectionEpoch {
        self.epoch = SelectionEpoch(self.epoch.0 + 1);
        self.epoch
    }

    /// Replace the selection, reset analysis and chat, and request a fresh analysis.
    pub fn select(&mut self, click: RegionClick) {
        let epoch = self.next_epoch();
        let record = economy::lookup(&click.iso_code);
        let region_name = record
            .map(|r| r.display_name.to_string())
            .or_else(|| Some(click.display_name.trim().to_string()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| UNKNOWN_REGION.to_string());

        info!(iso = %click.iso_code, region = %region_name, known = record.is_some(), "region selected");

        self.selected = Some(SelectedRegion {
            region_name: region_name.clone(),
            iso_code: click.iso_code,
            record,
        });
        self.transcript.clear();
        self.streaming = None;
        self.analysis = AnalysisText::Loading;

        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let timeout = self.request_timeout;
        self.runtime.spawn(async move {
            let text = analysis::generate_analysis(service.as_ref(), &region_name, record, timeout).await;
            let _ = tx.send(ControllerEvent::AnalysisReady { epoch, text });
        });
    }

    /// Close the panel. In-flight work is left to finish and its results are discarded.
    pub fn deselect(&mut self) {
        if self.selected.is_none() {
            return;
        }
        self.next_epoch();
        debug!("selection cleared");
        self.selected = None;
        self.analysis = AnalysisText::Empty;
        self.transcript.clear();
        self.streaming = None;
    }

    /// Send a chat message about the current region. Returns false when the
    /// message was not sent: blank text, no selection, or a reply still streaming.
    pub fn send_message(&mut self, text: &str) -> bool {
        let message = text.trim();
        if message.is_empty() || self.streaming.is_some() {
            return false;
        }
        let Some(selected) = &self.selected else {
            return false;
        };

        let request = chat::build_request(
            self.transcript.turns(),
            &selected.region_name,
            self.analysis.as_str(),
            message,
        );

        self.transcript.push(ChatTurn::user(message));
        let turn = self.transcript.push(ChatTurn::assistant(""));
        self.streaming = Some(turn);

        let epoch = self.epoch;
        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let timeout = self.request_timeout;
        self.runtime.spawn(async move {
            let finished = match relay_reply(service.as_ref(), &request, &tx, epoch, turn, timeout).await {
                Ok(()) => ControllerEvent::ChatFinished { epoch, turn },
                Err(e) => {
                    warn!(error = %e, "chat reply failed");
                    ControllerEvent::ChatFailed { epoch, turn }
                }
            };
            let _ = tx.send(finished);
        });
        true
    }

    /// Apply one event. Returns false if it was stale and discarded.
    pub fn apply(&mut self, event: ControllerEvent) -> bool {
        if event.epoch() != self.epoch || self.selected.is_none() {
            debug!(?event, current = ?self.epoch, "discarding stale result");
            return false;
        }

        match event {
            ControllerEvent::AnalysisReady { text, .. } => {
                self.analysis = AnalysisText::Ready(text);
            }
            ControllerEvent::ChatFragment { turn, text, .. } => {
                if self.streaming == Some(turn) {
                    self.transcript.append(turn, &text);
                }
            }
            ControllerEvent::ChatFinished { turn, .. } => {
                if self.streaming == Some(turn) {
                    self.streaming = None;
                }
            }
            ControllerEvent::ChatFailed { turn, .. } => {
                if self.streaming == Some(turn) {
                    // Partial text is replaced by the apology
                    self.transcript.replace(turn, CHAT_FAILURE);
                    self.streaming = None;
                }
            }
        }
        true
    }

    /// Apply every pending event in arrival order; called once per UI frame.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next event and apply it. Returns whether it was applied.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv_async().await {
            Ok(event) => self.apply(event),
            Err(_) => false,
        }
    }
}

/// Forward reply fragments to the controller until the stream ends, fails, or
/// the deadline passes. A reply that ends without any text counts as a failure.
async fn relay_reply(
    service: &dyn GenerativeService,
    request: &ChatRequest,
    tx: &flume::Sender<ControllerEvent>,
    epoch: SelectionEpoch,
    turn: TurnHandle,
    timeout: Duration,
) -> Result<(), GenerationError> {
    let deadline = Instant::now() + timeout;
    let mut fragments = timeout_at(deadline, chat::stream_reply(service, request))
        .await
        .map_err(|_| GenerationError::Timeout(timeout))??;

    let mut relayed = false;
    loop {
        match timeout_at(deadline, fragments.next()).await {
            Err(_) => return Err(GenerationError::Timeout(timeout)),
            Ok(None) if relayed => return Ok(()),
            Ok(None) => return Err(GenerationError::Service("empty reply".into())),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(text))) => {
                if text.is_empty() {
                    continue;
                }
                relayed = true;
                let fragment = ControllerEvent::ChatFragment { epoch, turn, text };
                if tx.send(fragment).is_err() {
                    // Controller is gone; nobody is listening
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ANALYSIS_FAILURE;
    use crate::chat::Speaker;
    use crate::gemini::testing::{FakeService, Scripted};
    use tokio::sync::Notify;

    fn click(iso: &str, name: &str) -> RegionClick {
        RegionClick {
            iso_code: iso.to_string(),
            display_name: name.to_string(),
            centroid_lat: 0.0,
            centroid_lng: 0.0,
        }
    }

    fn controller(service: FakeService) -> (Controller, Arc<FakeService>) {
        controller_with_timeout(service, Duration::from_secs(5))
    }

    fn controller_with_timeout(service: FakeService, timeout: Duration) -> (Controller, Arc<FakeService>) {
        let service = Arc::new(service);
        let controller = Controller::new(service.clone(), Handle::current(), timeout);
        (controller, service)
    }

    /// Pump events until the chat reply settles
    async fn settle_chat(controller: &mut Controller) {
        while controller.is_streaming() {
            controller.next_event().await;
        }
    }

    #[tokio::test]
    async fn test_select_loads_analysis() {
        let (mut c, service) = controller(
            FakeService::default().with_analysis("United States", Scripted::Text("US outlook".into())),
        );
        c.select(click("USA", "United States of America"));

        let selected = c.selected().unwrap();
        assert_eq!(selected.region_name, "United States");
        assert_eq!(selected.record.unwrap().rank, 1);
        assert_eq!(c.analysis(), &AnalysisText::Loading);
        assert_eq!(c.phase(), Phase::AnalysisPending);

        assert!(c.next_event().await);
        assert_eq!(c.analysis(), &AnalysisText::Ready("US outlook".into()));
        assert_eq!(c.phase(), Phase::Idle);
        assert_eq!(service.generate_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_region_uses_boundary_name_or_generic_label() {
        let (mut c, _) = controller(FakeService::default());
        c.select(click("TCD", "Chad"));
        assert_eq!(c.selected().unwrap().region_name, "Chad");
        assert!(c.selected().unwrap().record.is_none());

        c.select(click("", "  "));
        assert_eq!(c.selected().unwrap().region_name, UNKNOWN_REGION);
    }

    #[tokio::test]
    async fn test_stale_analysis_is_discarded() {
        let gate = Arc::new(Notify::new());
        let (mut c, _) = controller(
            FakeService::default()
                .with_analysis("Japan", Scripted::Gated(gate.clone(), "A text".into()))
                .with_analysis("Brazil", Scripted::Text("B text".into())),
        );

        c.select(click("JPN", "Japan"));
        c.select(click("BRA", "Brazil"));

        assert!(c.next_event().await);
        assert_eq!(c.analysis(), &AnalysisText::Ready("B text".into()));

        gate.notify_one();
        assert!(!c.next_event().await);
        assert_eq!(c.analysis(), &AnalysisText::Ready("B text".into()));
        assert_eq!(c.selected().unwrap().region_name, "Brazil");
    }

    #[tokio::test]
    async fn test_stale_event_before_newer_result() {
        let gate = Arc::new(Notify::new());
        let (mut c, _) = controller(
            FakeService::default()
                .with_analysis("Japan", Scripted::Text("A text".into()))
                .with_analysis("Brazil", Scripted::Gated(gate.clone(), "B text".into())),
        );

        c.select(click("JPN", "Japan"));
        c.select(click("BRA", "Brazil"));

        // Japan's result arrives first and must not touch Brazil's loading state
        assert!(!c.next_event().await);
        assert_eq!(c.analysis(), &AnalysisText::Loading);

        gate.notify_one();
        assert!(c.next_event().await);
        assert_eq!(c.analysis(), &AnalysisText::Ready("B text".into()));
    }

    #[tokio::test]
    async fn test_streamed_reply_grows_single_turn() {
        let (mut c, service) = controller(
            FakeService::default()
                .with_analysis("India", Scripted::Text("IN outlook".into()))
                .with_reply(vec![Ok("Hel"), Ok("lo wo"), Ok("rld")]),
        );
        c.select(click("IND", "India"));
        c.next_event().await;

        assert!(c.send_message("  How big is it?  "));
        assert!(c.is_streaming());
        // Second message is refused while the reply streams
        assert!(!c.send_message("again"));

        settle_chat(&mut c).await;

        let turns = c.transcript().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ChatTurn::user("How big is it?"));
        assert_eq!(turns[1], ChatTurn::assistant("Hello world"));

        let requests = service.chat_requests.lock().unwrap();
        let history = &requests[0].history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "I am looking at India. Context: IN outlook");
    }

    #[tokio::test]
    async fn test_follow_up_sends_real_history() {
        let (mut c, service) = controller(
            FakeService::default()
                .with_analysis("India", Scripted::Text("ctx".into()))
                .with_reply(vec![Ok("first")])
                .with_reply(vec![Ok("second")]),
        );
        c.select(click("IND", "India"));
        c.next_event().await;

        c.send_message("q1");
        settle_chat(&mut c).await;
        c.send_message("q2");
        settle_chat(&mut c).await;

        assert_eq!(c.transcript().len(), 4);
        let requests = service.chat_requests.lock().unwrap();
        let texts: Vec<_> = requests[1].history.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["q1", "first"]);
        assert_eq!(requests[1].message, "q2");
    }

    #[tokio::test]
    async fn test_stream_failure_replaces_partial_text() {
        let (mut c, _) = controller(
            FakeService::default()
                .with_analysis("India", Scripted::Text("ctx".into()))
                .with_reply(vec![Ok("partial "), Err(())]),
        );
        c.select(click("IND", "India"));
        c.next_event().await;

        c.send_message("q");
        settle_chat(&mut c).await;

        let turns = c.transcript().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].speaker, Speaker::Assistant);
        assert_eq!(turns[1].text, CHAT_FAILURE);
    }

    #[tokio::test]
    async fn test_stream_open_failure_yields_apology() {
        // No scripted reply: opening the stream fails
        let (mut c, _) = controller(FakeService::default().with_analysis("India", Scripted::Text("ctx".into())));
        c.select(click("IND", "India"));
        c.next_event().await;

        c.send_message("q");
        settle_chat(&mut c).await;
        assert_eq!(c.transcript().turns()[1], ChatTurn::assistant(CHAT_FAILURE));
    }

    #[tokio::test]
    async fn test_stalled_reply_times_out_with_apology() {
        let (mut c, _) = controller_with_timeout(
            FakeService::default()
                .with_analysis("India", Scripted::Text("ctx".into()))
                .with_stalled_reply(vec![Ok("part")])
                .with_stalled_reply(vec![]),
            Duration::from_millis(50),
        );
        c.select(click("IND", "India"));
        c.next_event().await;

        // A fragment arrives, then the stream goes quiet
        c.send_message("q");
        settle_chat(&mut c).await;
        assert!(!c.is_streaming());
        assert_eq!(c.transcript().turns()[1], ChatTurn::assistant(CHAT_FAILURE));

        // Nothing arrives at all
        c.send_message("q2");
        settle_chat(&mut c).await;
        assert!(!c.is_streaming());
        let turns = c.transcript().turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[3], ChatTurn::assistant(CHAT_FAILURE));
    }

    #[tokio::test]
    async fn test_empty_reply_yields_apology() {
        let (mut c, service) = controller(
            FakeService::default()
                .with_analysis("India", Scripted::Text("ctx".into()))
                .with_reply(vec![Ok("")])
                .with_reply(vec![Ok("fine")]),
        );
        c.select(click("IND", "India"));
        c.next_event().await;

        c.send_message("q1");
        settle_chat(&mut c).await;
        assert_eq!(c.transcript().turns()[1], ChatTurn::assistant(CHAT_FAILURE));

        // History keeps alternating speakers
        c.send_message("q2");
        settle_chat(&mut c).await;
        let requests = service.chat_requests.lock().unwrap();
        let texts: Vec<_> = requests[1].history.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, ["q1", CHAT_FAILURE]);
    }

    #[tokio::test]
    async fn test_close_clears_and_reselect_restarts() {
        let (mut c, service) = controller(
            FakeService::default()
                .with_analysis("Germany", Scripted::Text("first".into()))
                .with_reply(vec![Ok("ok")]),
        );
        c.select(click("DEU", "Germany"));
        c.next_event().await;
        c.send_message("q");
        settle_chat(&mut c).await;
        assert_eq!(c.transcript().len(), 2);

        c.deselect();
        assert!(c.selected().is_none());
        assert_eq!(c.analysis(), &AnalysisText::Empty);
        assert!(c.transcript().is_empty());

        c.select(click("DEU", "Germany"));
        assert_eq!(c.analysis(), &AnalysisText::Loading);
        assert!(c.transcript().is_empty());
        assert!(c.next_event().await);
        assert_eq!(service.generate_count(), 2);
    }

    #[tokio::test]
    async fn test_late_chat_after_close_is_ignored() {
        let (mut c, _) = controller(
            FakeService::default()
                .with_analysis("Germany", Scripted::Text("ctx".into()))
                .with_reply(vec![Ok("late"), Ok(" words")]),
        );
        c.select(click("DEU", "Germany"));
        c.next_event().await;
        c.send_message("q");
        c.deselect();

        // Fragments and the finish report all arrive stale
        for _ in 0..3 {
            assert!(!c.next_event().await);
        }
        assert!(c.transcript().is_empty());
        assert!(!c.is_streaming());
    }

    #[tokio::test]
    async fn test_analysis_after_close_is_ignored() {
        let (mut c, _) = controller(FakeService::default().with_analysis("Germany", Scripted::Text("late".into())));
        c.select(click("DEU", "Germany"));
        c.deselect();

        assert!(!c.next_event().await);
        assert!(c.selected().is_none());
        assert_eq!(c.analysis(), &AnalysisText::Empty);
    }

    #[tokio::test]
    async fn test_failure_for_finished_turn_is_ignored() {
        let (mut c, _) = controller(
            FakeService::default()
                .with_analysis("Germany", Scripted::Text("ctx".into()))
                .with_reply(vec![Ok("done")]),
        );
        c.select(click("DEU", "Germany"));
        c.next_event().await;
        c.send_message("q");
        settle_chat(&mut c).await;

        let turn = TurnHandle::at(1);
        assert!(c.apply(ControllerEvent::ChatFailed { epoch: c.epoch, turn }));
        assert_eq!(c.transcript().turns()[1], ChatTurn::assistant("done"));
    }

    #[tokio::test]
    async fn test_analysis_failure_leaves_transcript_unchanged() {
        let (mut c, _) = controller(FakeService::default().with_analysis("France", Scripted::Fail));
        c.select(click("FRA", "France"));
        c.next_event().await;
        assert_eq!(c.analysis(), &AnalysisText::Ready(ANALYSIS_FAILURE.into()));
        assert!(c.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_selection_and_text() {
        let (mut c, _) = controller(FakeService::default());
        assert!(!c.send_message("hello"));
        c.select(click("FRA", "France"));
        assert!(!c.send_message("   "));
        assert!(c.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_drain_applies_pending_events() {
        let (mut c, _) = controller(FakeService::default().with_analysis("France", Scripted::Text("fr".into())));
        c.select(click("FRA", "France"));
        while c.phase() == Phase::AnalysisPending {
            tokio::task::yield_now().await;
            c.drain();
        }
        assert_eq!(c.analysis(), &AnalysisText::Ready("fr".into()));
    }
}
