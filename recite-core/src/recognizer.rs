//! Recognizer connection and the recitation event loop
//!
//! The recognizer backend is external; this module only depends on the
//! `Recognizer` / `RecognizerLink` seam. Inbound messages arrive on a bounded
//! channel and are consumed by a single loop that runs one alignment pass per
//! message, in order. Captured audio is framed and forwarded on the same loop.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioData, AudioInput, encode_pcm16le};
use crate::config::RecitationConfig;
use crate::error::{Error, Result};
use crate::fuzzy::{SharedHomonyms, load_homonyms};
use crate::protocol::{OutboundMessage, parse_inbound};
use crate::session::{AlignmentSession, SessionUpdate};
use crate::tokenizer::Passage;

/// Sending half of an open recognizer connection
#[async_trait]
pub trait RecognizerLink: Send {
    /// Send a JSON control message
    async fn send_message(&mut self, message: &OutboundMessage) -> Result<()>;

    /// Send one binary PCM frame
    async fn send_audio(&mut self, frame: AudioData) -> Result<()>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// Frame written by a `ChannelLink`
#[derive(Debug, Clone, PartialEq)]
pub enum LinkFrame {
    Text(String),
    Binary(AudioData),
    Close,
}

/// `RecognizerLink` that hands frames to a host-owned socket task
pub struct ChannelLink {
    tx: mpsc::Sender<LinkFrame>,
}

impl ChannelLink {
    pub fn new(tx: mpsc::Sender<LinkFrame>) -> Self {
        Self { tx }
    }

    async fn push(&self, frame: LinkFrame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| Error::ChannelClosed)
    }
}

#[async_trait]
impl RecognizerLink for ChannelLink {
    async fn send_message(&mut self, message: &OutboundMessage) -> Result<()> {
        self.push(LinkFrame::Text(message.to_json()?)).await
    }

    async fn send_audio(&mut self, frame: AudioData) -> Result<()> {
        self.push(LinkFrame::Binary(frame)).await
    }

    async fn close(&mut self) -> Result<()> {
        // the socket task may already be gone
        if self.push(LinkFrame::Close).await.is_err() {
            debug!("Link closed before close frame");
        }
        Ok(())
    }
}

/// An open connection: the link plus the inbound message queue
pub struct Connection {
    pub link: Box<dyn RecognizerLink>,
    /// Raw JSON messages from the recognizer, in delivery order
    pub inbound: mpsc::Receiver<String>,
}

/// Trait for streaming recognizer backends
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Open a streaming connection with an inbound queue of `capacity`
    async fn connect(&self, capacity: usize) -> Result<Connection>;
}

struct ActiveStream {
    link: Box<dyn RecognizerLink>,
    inbound: mpsc::Receiver<String>,
    audio: mpsc::Receiver<Vec<f32>>,
    audio_done: bool,
}

enum Incoming {
    Message(Option<String>),
    Audio(Option<Vec<f32>>),
}

/// Drives one session from a live recognizer connection
pub struct RecitationDriver {
    session: AlignmentSession,
    homonyms: SharedHomonyms,
    recognizer: Arc<dyn Recognizer>,
    audio: Box<dyn AudioInput>,
    active: Option<ActiveStream>,
}

impl RecitationDriver {
    pub fn new(
        passage: Passage,
        config: RecitationConfig,
        recognizer: Arc<dyn Recognizer>,
        audio: Box<dyn AudioInput>,
    ) -> Self {
        let homonyms = SharedHomonyms::default();
        let session = AlignmentSession::new(passage, config, homonyms.clone());
        Self {
            session,
            homonyms,
            recognizer,
            audio,
            active: None,
        }
    }

    /// Load the configured homonym table in the background
    ///
    /// Matching runs without homonyms until the load lands.
    pub fn spawn_homonym_load(&self) -> Option<JoinHandle<bool>> {
        let source = self.session.config().homonyms_source.clone()?;
        let shared = self.homonyms.clone();
        Some(tokio::spawn(async move { load_homonyms(&shared, &source).await }))
    }

    pub fn session(&self) -> &AlignmentSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AlignmentSession {
        &mut self.session
    }

    pub fn is_transcribing(&self) -> bool {
        self.active.is_some()
    }

    /// Acquire audio, connect, and send the target words
    ///
    /// A no-op while already transcribing. On failure nothing stays open.
    pub async fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            debug!("Already transcribing, ignoring start");
            return Ok(());
        }

        let audio = self.audio.open().await?;

        let capacity = self.session.config().channel_capacity;
        let connection = match self.recognizer.connect(capacity).await {
            Ok(connection) => connection,
            Err(e) => {
                self.audio.release();
                return Err(e);
            }
        };

        let mut link = connection.link;
        let init = OutboundMessage::Init {
            words: self.session.target_words().to_vec(),
        };
        if let Err(e) = link.send_message(&init).await {
            if let Err(close_err) = link.close().await {
                warn!("Failed to close recognizer link: {}", close_err);
            }
            self.audio.release();
            return Err(e);
        }

        info!(
            session = %self.session.id(),
            recognizer = self.recognizer.name(),
            "Transcription started"
        );

        self.active = Some(ActiveStream {
            link,
            inbound: connection.inbound,
            audio,
            audio_done: false,
        });
        Ok(())
    }

    /// Close the connection and release audio; progress is kept
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        let closed = active.link.close().await;
        self.audio.release();
        info!(session = %self.session.id(), "Transcription stopped");
        closed
    }

    /// Reset progress without touching the connection
    pub fn clear(&mut self) {
        self.session.clear();
    }

    /// Reveal the next word and forward any vocabulary change
    pub async fn reveal_next(&mut self) -> Result<Option<SessionUpdate>> {
        let Some(update) = self.session.reveal_next() else {
            return Ok(None);
        };
        self.push_vocabulary(&update).await?;
        Ok(Some(update))
    }

    /// Wait for the next alignment pass
    ///
    /// Forwards audio while waiting and silently drops malformed messages.
    /// Returns `None` once the connection is gone.
    pub async fn next_update(&mut self) -> Result<Option<SessionUpdate>> {
        loop {
            let Some(active) = self.active.as_mut() else {
                return Ok(None);
            };

            let incoming = tokio::select! {
                biased;
                block = active.audio.recv(), if !active.audio_done => Incoming::Audio(block),
                message = active.inbound.recv() => Incoming::Message(message),
            };

            match incoming {
                Incoming::Audio(Some(samples)) => {
                    active.link.send_audio(encode_pcm16le(&samples)).await?;
                }
                Incoming::Audio(None) => {
                    debug!("Audio input ended");
                    active.audio_done = true;
                }
                Incoming::Message(Some(raw)) => {
                    let Some(message) = parse_inbound(&raw) else {
                        continue;
                    };
                    let update = self.session.apply_message(&message);
                    self.push_vocabulary(&update).await?;
                    return Ok(Some(update));
                }
                Incoming::Message(None) => {
                    info!("Recognizer closed the stream");
                    self.stop().await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Consume the connection until it closes, reporting every pass
    pub async fn run<F>(&mut self, mut on_update: F) -> Result<()>
    where
        F: FnMut(&AlignmentSession, &SessionUpdate),
    {
        while let Some(update) = self.next_update().await? {
            on_update(&self.session, &update);
        }
        Ok(())
    }

    async fn push_vocabulary(&mut self, update: &SessionUpdate) -> Result<()> {
        let (Some(words), Some(active)) = (&update.vocabulary, self.active.as_mut()) else {
            return Ok(());
        };
        debug!(words = words.len(), "Pushing vocabulary update");
        active
            .link
            .send_message(&OutboundMessage::UpdateVocab {
                words: words.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenState;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Message(OutboundMessage),
        Audio(usize),
        Closed,
    }

    struct MockLink {
        sent: Arc<Mutex<Vec<Sent>>>,
    }

    #[async_trait]
    impl RecognizerLink for MockLink {
        async fn send_message(&mut self, message: &OutboundMessage) -> Result<()> {
            self.sent.lock().push(Sent::Message(message.clone()));
            Ok(())
        }

        async fn send_audio(&mut self, frame: AudioData) -> Result<()> {
            self.sent.lock().push(Sent::Audio(frame.len()));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.sent.lock().push(Sent::Closed);
            Ok(())
        }
    }

    struct MockRecognizer {
        inbound: Mutex<Option<mpsc::Receiver<String>>>,
        sent: Arc<Mutex<Vec<Sent>>>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Recognizer for MockRecognizer {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn connect(&self, _capacity: usize) -> Result<Connection> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let inbound = self
                .inbound
                .lock()
                .take()
                .ok_or_else(|| Error::Recognizer("already connected".to_string()))?;
            Ok(Connection {
                link: Box::new(MockLink {
                    sent: Arc::clone(&self.sent),
                }),
                inbound,
            })
        }
    }

    struct MockAudio {
        deny: bool,
        released: Arc<AtomicBool>,
        feed: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    }

    #[async_trait]
    impl AudioInput for MockAudio {
        async fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>> {
            if self.deny {
                return Err(Error::Audio("microphone permission denied".to_string()));
            }
            let (tx, rx) = mpsc::channel(8);
            *self.feed.lock() = Some(tx);
            Ok(rx)
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
            self.feed.lock().take();
        }
    }

    struct Harness {
        driver: RecitationDriver,
        inbound: mpsc::Sender<String>,
        sent: Arc<Mutex<Vec<Sent>>>,
        recognizer: Arc<MockRecognizer>,
        released: Arc<AtomicBool>,
        feed: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    }

    fn harness(text: &str, deny: bool) -> Harness {
        let (inbound, rx) = mpsc::channel(8);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let recognizer = Arc::new(MockRecognizer {
            inbound: Mutex::new(Some(rx)),
            sent: Arc::clone(&sent),
            connects: AtomicUsize::new(0),
        });
        let released = Arc::new(AtomicBool::new(false));
        let feed = Arc::new(Mutex::new(None));
        let audio = MockAudio {
            deny,
            released: Arc::clone(&released),
            feed: Arc::clone(&feed),
        };
        let driver = RecitationDriver::new(
            Passage::from_text(text),
            RecitationConfig::default(),
            recognizer.clone(),
            Box::new(audio),
        );
        Harness {
            driver,
            inbound,
            sent,
            recognizer,
            released,
            feed,
        }
    }

    #[tokio::test]
    async fn test_start_sends_init_once() {
        let mut h = harness("In the beginning God created.", false);

        h.driver.start().await.unwrap();
        h.driver.start().await.unwrap();

        assert!(h.driver.is_transcribing());
        assert_eq!(h.recognizer.connects.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.sent.lock()[0],
            Sent::Message(OutboundMessage::Init {
                words: vec![
                    "in".to_string(),
                    "the".to_string(),
                    "beginning".to_string(),
                    "god".to_string(),
                    "created".to_string(),
                ],
            })
        );
    }

    #[tokio::test]
    async fn test_messages_drive_alignment() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();

        h.inbound
            .send(r#"{"type":"partial","data":"in the"}"#.to_string())
            .await
            .unwrap();
        let update = h.driver.next_update().await.unwrap().unwrap();
        assert!(update.partial);
        assert!(h.driver.session().marks()[1].temp);

        h.inbound
            .send(r#"{"type":"result","data":"in the beginning"}"#.to_string())
            .await
            .unwrap();
        let update = h.driver.next_update().await.unwrap().unwrap();
        assert!(!update.partial);
        assert_eq!(update.cursor.unwrap().token_index, 2);
        assert!(h.driver.session().marks()[..3]
            .iter()
            .all(|m| m.state == TokenState::Correct && !m.temp));
    }

    #[tokio::test]
    async fn test_malformed_messages_dropped() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();

        h.inbound.send("garbage".to_string()).await.unwrap();
        h.inbound
            .send(r#"{"type":"result","data":"in the"}"#.to_string())
            .await
            .unwrap();

        let update = h.driver.next_update().await.unwrap().unwrap();
        assert_eq!(update.changed, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_audio_forwarded_as_pcm() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();

        let feed = h.feed.lock().clone().unwrap();
        feed.send(vec![0.5; 4]).await.unwrap();
        h.inbound
            .send(r#"{"type":"partial","data":"in"}"#.to_string())
            .await
            .unwrap();

        h.driver.next_update().await.unwrap().unwrap();
        assert!(h.sent.lock().contains(&Sent::Audio(8)));
    }

    #[tokio::test]
    async fn test_vocabulary_update_pushed() {
        let mut h = harness("And Melchizedek king of Salem.", false);
        h.driver.start().await.unwrap();

        h.inbound
            .send(r#"{"type":"unrecognized","subRecs":{"melchizedek":["mel"]}}"#.to_string())
            .await
            .unwrap();
        h.driver.next_update().await.unwrap().unwrap();

        assert_eq!(
            h.sent.lock().last(),
            Some(&Sent::Message(OutboundMessage::UpdateVocab {
                words: vec!["melchizedek".to_string()],
            }))
        );
    }

    #[tokio::test]
    async fn test_stop_keeps_progress() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();
        h.inbound
            .send(r#"{"type":"result","data":"in the beginning"}"#.to_string())
            .await
            .unwrap();
        h.driver.next_update().await.unwrap();

        h.driver.stop().await.unwrap();

        assert!(!h.driver.is_transcribing());
        assert!(h.released.load(Ordering::SeqCst));
        assert!(h.sent.lock().contains(&Sent::Closed));
        assert_eq!(h.driver.session().cursor().unwrap().token_index, 2);
        assert!(h.driver.next_update().await.unwrap().is_none());

        // stopping again is harmless
        h.driver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_audio_denied() {
        let mut h = harness("In the beginning.", true);

        let err = h.driver.start().await.unwrap_err();

        assert!(matches!(err, Error::Audio(_)));
        assert!(!h.driver.is_transcribing());
        assert_eq!(h.recognizer.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_audio() {
        let mut h = harness("In the beginning.", false);
        h.recognizer.inbound.lock().take();

        assert!(h.driver.start().await.is_err());
        assert!(!h.driver.is_transcribing());
        assert!(h.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_close_stops_driver() {
        let mut h = harness("In the beginning.", false);
        h.driver.start().await.unwrap();
        drop(h.inbound);

        assert!(h.driver.next_update().await.unwrap().is_none());
        assert!(!h.driver.is_transcribing());
        assert!(h.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_clear_keeps_connection() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();
        h.inbound
            .send(r#"{"type":"result","data":"in the beginning"}"#.to_string())
            .await
            .unwrap();
        h.driver.next_update().await.unwrap();

        h.driver.clear();

        assert!(h.driver.is_transcribing());
        assert_eq!(h.driver.session().cursor(), None);
    }

    #[tokio::test]
    async fn test_reveal_next() {
        let mut h = harness("In the beginning God created.", false);
        let update = h.driver.reveal_next().await.unwrap().unwrap();
        assert_eq!(update.cursor.unwrap().token_index, 0);
        assert_eq!(
            h.driver.session().marks()[0].state,
            TokenState::Overridden
        );
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let mut h = harness("In the beginning God created.", false);
        h.driver.start().await.unwrap();
        h.inbound
            .send(r#"{"type":"result","data":"in the beginning"}"#.to_string())
            .await
            .unwrap();
        h.inbound
            .send(r#"{"type":"result","data":"god created"}"#.to_string())
            .await
            .unwrap();
        drop(h.inbound);

        let mut cursors = Vec::new();
        h.driver
            .run(|_, update| cursors.push(update.cursor.map(|c| c.token_index)))
            .await
            .unwrap();

        assert_eq!(cursors, vec![Some(2), Some(4)]);
    }

    #[tokio::test]
    async fn test_channel_link_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut link = ChannelLink::new(tx);

        link.send_message(&OutboundMessage::UpdateVocab {
            words: vec!["salem".to_string()],
        })
        .await
        .unwrap();
        link.send_audio(vec![1, 2]).await.unwrap();
        link.close().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(LinkFrame::Text(
                r#"{"type":"update_vocab","words":["salem"]}"#.to_string()
            ))
        );
        assert_eq!(rx.recv().await, Some(LinkFrame::Binary(vec![1, 2])));
        assert_eq!(rx.recv().await, Some(LinkFrame::Close));

        drop(rx);
        let err = link.send_audio(vec![0]).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
        assert!(link.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_homonym_load_without_source() {
        let h = harness("In the beginning.", false);
        assert!(h.driver.spawn_homonym_load().is_none());
    }
}
