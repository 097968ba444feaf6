//! The engine task that drives one chatroom.
//!
//! A [`ChatEngine`] owns a [`ChatRoom`] and is the only thing that touches
//! it. Three inputs feed the engine, one at a time:
//!
//! - commands from any number of [`EngineHandle`]s
//! - transport events (diff batches and fetch completions)
//! - the room's next timer deadline
//!
//! The outer loop initializes the room, serves it until it is told to stop,
//! and starts over if the resume flag was set (a routing-prefix change).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use parley_core::Name;
use parley_presence::{ChatRoom, RoomConfig, RoomEvent};
use parley_sync::{MemoryNetwork, MemoryTransport, Transport, TransportEvent};

use crate::error::{EngineError, Result};

/// Requests posted into the engine's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a chat line.
    SendChat { text: String, timestamp: i64 },
    /// Switch routing prefix, restarting the session if it changed.
    UpdateRoutingPrefix(Name),
    /// Leave and stop.
    Shutdown,
}

/// Whether the engine should start another session after the current one
/// ends. Shared between the engine and its handles.
#[derive(Debug, Clone, Default)]
pub struct ResumeFlag(Arc<AtomicBool>);

impl ResumeFlag {
    /// Request another session.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Withdraw the request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Read and reset the flag.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Read the flag.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cloneable, thread-safe way to talk to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    resume: ResumeFlag,
}

impl EngineHandle {
    /// Publish a chat line. Ignored by the room unless it has joined.
    pub fn send_chat(&self, text: impl Into<String>, timestamp: i64) -> Result<()> {
        self.send(Command::SendChat {
            text: text.into(),
            timestamp,
        })
    }

    /// Switch to a new routing prefix.
    pub fn update_routing_prefix(&self, prefix: Name) -> Result<()> {
        self.send(Command::UpdateRoutingPrefix(prefix))
    }

    /// Ask the engine to leave and stop. Calling this again, or after the
    /// engine stopped, does nothing.
    pub fn shutdown(&self) {
        self.resume.clear();
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Whether the engine task has exited.
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Stopped)
    }
}

/// One input taken from the engine's queues.
enum Input {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Timer,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Restart,
    Stop,
}

/// Runs a [`ChatRoom`] on a Tokio task.
pub struct ChatEngine<T: Transport> {
    room: ChatRoom<T>,
    commands: mpsc::UnboundedReceiver<Command>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<RoomEvent>,
    resume: ResumeFlag,
}

impl<T: Transport + 'static> ChatEngine<T> {
    /// Create an engine for `transport`, whose events arrive on
    /// `transport_events`.
    ///
    /// Returns the engine, a handle to it and the receiver observer events
    /// are forwarded to.
    pub fn new(
        config: RoomConfig,
        transport: T,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<(Self, EngineHandle, mpsc::UnboundedReceiver<RoomEvent>)> {
        let room = ChatRoom::new(config, transport)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let resume = ResumeFlag::default();

        let engine = Self {
            room,
            commands: command_rx,
            transport_events,
            events: event_tx,
            resume: resume.clone(),
        };
        let handle = EngineHandle {
            commands: command_tx,
            resume,
        };
        Ok((engine, handle, event_rx))
    }

    /// Run the engine on a new task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Serve sessions until shut down.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let session = self.room.initialize_sync(now());
            self.flush_events();
            tracing::info!(session = %session, "engine serving session");

            let exit = self.serve().await;
            if exit == Exit::Restart && self.resume.take() {
                tracing::info!("restarting under new routing prefix");
                continue;
            }
            break;
        }

        tokio::time::sleep(self.room.config().shutdown_grace()).await;
        tracing::info!("engine stopped");
        Ok(())
    }

    async fn serve(&mut self) -> Exit {
        loop {
            let deadline = self.room.next_deadline().map(Instant::from_std);
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let input = tokio::select! {
                biased;
                command = self.commands.recv() => Input::Command(command),
                event = self.transport_events.recv() => Input::Transport(event),
                () = timer => Input::Timer,
            };

            let exit = match input {
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => {
                    tracing::debug!("all handles dropped");
                    self.stop()
                }
                Input::Transport(Some(event)) => {
                    self.handle_transport_event(event);
                    None
                }
                Input::Transport(None) => {
                    tracing::warn!("transport event channel closed");
                    self.stop()
                }
                Input::Timer => {
                    self.room.advance(now());
                    None
                }
            };

            self.flush_events();
            if let Some(exit) = exit {
                return exit;
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Option<Exit> {
        match command {
            Command::SendChat { text, timestamp } => {
                self.room.send_chat(&text, timestamp);
                None
            }
            Command::UpdateRoutingPrefix(prefix) => {
                if !self.room.update_routing_prefix(prefix) {
                    return None;
                }
                self.resume.set();
                self.room.close();
                Some(Exit::Restart)
            }
            Command::Shutdown => self.stop(),
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::SyncUpdate(diffs) => {
                self.room.process_sync_update(&diffs);
            }
            TransportEvent::FetchCompleted(completion) => {
                self.room.on_fetch_completed(completion, now());
            }
        }
    }

    fn stop(&mut self) -> Option<Exit> {
        self.resume.clear();
        self.room.close();
        Some(Exit::Stop)
    }

    fn flush_events(&mut self) {
        for event in self.room.take_events() {
            // Nobody listening is fine.
            let _ = self.events.send(event);
        }
    }
}

impl ChatEngine<MemoryTransport> {
    /// Create an engine connected to an in-memory network.
    pub async fn connect(
        network: &Arc<MemoryNetwork>,
        config: RoomConfig,
    ) -> Result<(Self, EngineHandle, mpsc::UnboundedReceiver<RoomEvent>)> {
        let (transport, transport_events) = network.create_transport().await;
        Self::new(config, transport, transport_events)
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}
