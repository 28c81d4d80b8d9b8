use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::{CageOutcome, PhaseController};
use crate::error::RuntimeError;
use crate::roster::ParticipantId;
use crate::types::{
    BotCounts, LobbyPlayerView, MatchEvent, MatchPhase, MatchSummary, ProgressView, Team,
    Transform, Vec3,
};
use crate::world::MatchWorld;

const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 1024;

/// Point-in-time view of the room, sent to clients as they connect.
#[derive(Clone, Debug, Serialize)]
pub struct MatchSnapshot {
    pub phase: MatchPhase,
    pub players: Vec<LobbyPlayerView>,
    #[serde(rename = "hostId")]
    pub host_id: Option<String>,
    pub bots: BotCounts,
    pub progress: ProgressView,
    pub summary: Option<MatchSummary>,
}

#[derive(Debug)]
pub enum MatchCommand {
    Join {
        player_id: String,
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Ready {
        player_id: String,
        ready: bool,
        reply: oneshot::Sender<bool>,
    },
    SwitchTeam {
        player_id: String,
        team: Team,
        reply: oneshot::Sender<bool>,
    },
    ChooseCharacter {
        player_id: String,
        kind: u8,
        reply: oneshot::Sender<bool>,
    },
    AddBot {
        by: String,
        team: Team,
        reply: oneshot::Sender<bool>,
    },
    RemoveBot {
        by: String,
        team: Team,
        local_index: usize,
        reply: oneshot::Sender<bool>,
    },
    RestartLobby {
        by: String,
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        player_id: String,
        reply: oneshot::Sender<bool>,
    },
    ContributeProgression {
        object_id: String,
        weight: f32,
        reply: oneshot::Sender<bool>,
    },
    PlayerDeath {
        player_id: String,
        at: Transform,
        reply: oneshot::Sender<bool>,
    },
    Hold {
        holder_id: String,
        target: ParticipantId,
        reply: oneshot::Sender<bool>,
    },
    Release {
        holder_id: String,
        reply: oneshot::Sender<bool>,
    },
    Cage {
        holder_id: String,
        reply: oneshot::Sender<Option<CageOutcome>>,
    },
    AddSearchTask {
        location: Vec3,
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
}

/// Cloneable sender side of a running match.
#[derive(Clone, Debug)]
pub struct MatchClient {
    commands: mpsc::Sender<MatchCommand>,
    events: broadcast::Sender<MatchEvent>,
}

impl MatchClient {
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> MatchCommand) -> Result<T, RuntimeError> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| RuntimeError::Closed)?;
        answer.await.map_err(|_| RuntimeError::Closed)
    }

    pub async fn join(&self, player_id: &str, name: &str) -> Result<bool, RuntimeError> {
        let (player_id, name) = (player_id.to_string(), name.to_string());
        self.request(|reply| MatchCommand::Join { player_id, name, reply })
            .await
    }

    pub async fn set_ready(&self, player_id: &str, ready: bool) -> Result<bool, RuntimeError> {
        let player_id = player_id.to_string();
        self.request(|reply| MatchCommand::Ready { player_id, ready, reply })
            .await
    }

    pub async fn switch_team(&self, player_id: &str, team: Team) -> Result<bool, RuntimeError> {
        let player_id = player_id.to_string();
        self.request(|reply| MatchCommand::SwitchTeam { player_id, team, reply })
            .await
    }

    pub async fn choose_character(&self, player_id: &str, kind: u8) -> Result<bool, RuntimeError> {
        let player_id = player_id.to_string();
        self.request(|reply| MatchCommand::ChooseCharacter { player_id, kind, reply })
            .await
    }

    pub async fn add_bot(&self, by: &str, team: Team) -> Result<bool, RuntimeError> {
        let by = by.to_string();
        self.request(|reply| MatchCommand::AddBot { by, team, reply }).await
    }

    pub async fn remove_bot(&self, by: &str, team: Team, local_index: usize) -> Result<bool, RuntimeError> {
        let by = by.to_string();
        self.request(|reply| MatchCommand::RemoveBot {
            by,
            team,
            local_index,
            reply,
        })
        .await
    }

    pub async fn restart_lobby(&self, by: &str) -> Result<bool, RuntimeError> {
        let by = by.to_string();
        self.request(|reply| MatchCommand::RestartLobby { by, reply }).await
    }

    pub async fn disconnect(&self, player_id: &str) -> Result<bool, RuntimeError> {
        let player_id = player_id.to_string();
        self.request(|reply| MatchCommand::Disconnect { player_id, reply })
            .await
    }

    pub async fn contribute_progression(&self, object_id: &str, weight: f32) -> Result<bool, RuntimeError> {
        let object_id = object_id.to_string();
        self.request(|reply| MatchCommand::ContributeProgression {
            object_id,
            weight,
            reply,
        })
        .await
    }

    pub async fn player_death(&self, player_id: &str, at: Transform) -> Result<bool, RuntimeError> {
        let player_id = player_id.to_string();
        self.request(|reply| MatchCommand::PlayerDeath { player_id, at, reply })
            .await
    }

    pub async fn hold(&self, holder_id: &str, target: ParticipantId) -> Result<bool, RuntimeError> {
        let holder_id = holder_id.to_string();
        self.request(|reply| MatchCommand::Hold {
            holder_id,
            target,
            reply,
        })
        .await
    }

    pub async fn release(&self, holder_id: &str) -> Result<bool, RuntimeError> {
        let holder_id = holder_id.to_string();
        self.request(|reply| MatchCommand::Release { holder_id, reply })
            .await
    }

    pub async fn cage(&self, holder_id: &str) -> Result<Option<CageOutcome>, RuntimeError> {
        let holder_id = holder_id.to_string();
        self.request(|reply| MatchCommand::Cage { holder_id, reply }).await
    }

    pub async fn add_search_task(&self, location: Vec3) -> Result<usize, RuntimeError> {
        self.request(|reply| MatchCommand::AddSearchTask { location, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<MatchSnapshot, RuntimeError> {
        self.request(|reply| MatchCommand::Snapshot { reply }).await
    }
}

/// Owner side of a running match: hands out clients and stops the task.
pub struct MatchHandle<W: MatchWorld> {
    client: MatchClient,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<PhaseController<W>>,
}

impl<W: MatchWorld + Send + 'static> MatchHandle<W> {
    pub fn client(&self) -> MatchClient {
        self.client.clone()
    }

    /// Cancels every timer and gives the controller back.
    pub async fn shutdown(self) -> Result<PhaseController<W>, RuntimeError> {
        let _ = self.shutdown.send(true);
        Ok(self.task.await?)
    }
}

/// Moves the controller onto its own task. It ticks once per `tick_period`
/// and applies commands in arrival order between ticks.
pub fn spawn_match<W>(controller: PhaseController<W>, tick_period: Duration) -> MatchHandle<W>
where
    W: MatchWorld + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (event_tx, _) = broadcast::channel(EVENT_QUEUE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_match(
        controller,
        tick_period,
        command_rx,
        event_tx.clone(),
        shutdown_rx,
    ));
    MatchHandle {
        client: MatchClient {
            commands: command_tx,
            events: event_tx,
        },
        shutdown: shutdown_tx,
        task,
    }
}

async fn run_match<W: MatchWorld>(
    mut controller: PhaseController<W>,
    tick_period: Duration,
    mut commands: mpsc::Receiver<MatchCommand>,
    events: broadcast::Sender<MatchEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> PhaseController<W> {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick_period, tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(tick_ms = tick_period.as_millis() as u64, "match loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => controller.tick(),
            command = commands.recv() => match command {
                Some(command) => apply_command(&mut controller, command),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
        publish(&mut controller, &events);
    }

    controller.shutdown();
    publish(&mut controller, &events);
    info!("match loop stopped");
    controller
}

fn publish<W: MatchWorld>(controller: &mut PhaseController<W>, events: &broadcast::Sender<MatchEvent>) {
    for event in controller.drain_events() {
        // no subscribers is a normal state between connections
        let _ = events.send(event);
    }
}

fn host_only<W: MatchWorld>(controller: &PhaseController<W>, by: &str, operation: &str) -> bool {
    if controller.roster().is_host(by) {
        return true;
    }
    warn!(player_id = by, operation, "host-only request rejected");
    false
}

fn apply_command<W: MatchWorld>(controller: &mut PhaseController<W>, command: MatchCommand) {
    debug!(?command, "match command");
    // a dropped reply receiver only means the requester went away
    match command {
        MatchCommand::Join { player_id, name, reply } => {
            let _ = reply.send(controller.join_player(&player_id, &name));
        }
        MatchCommand::Ready { player_id, ready, reply } => {
            let _ = reply.send(controller.set_player_ready(&player_id, ready));
        }
        MatchCommand::SwitchTeam { player_id, team, reply } => {
            let _ = reply.send(controller.switch_player_team(&player_id, team));
        }
        MatchCommand::ChooseCharacter { player_id, kind, reply } => {
            let _ = reply.send(controller.choose_character(&player_id, kind));
        }
        MatchCommand::AddBot { by, team, reply } => {
            let added = host_only(controller, &by, "add_bot") && controller.add_bot(team);
            let _ = reply.send(added);
        }
        MatchCommand::RemoveBot {
            by,
            team,
            local_index,
            reply,
        } => {
            let removed = host_only(controller, &by, "remove_bot") && controller.remove_bot_at(team, local_index);
            let _ = reply.send(removed);
        }
        MatchCommand::RestartLobby { by, reply } => {
            let allowed = host_only(controller, &by, "restart_lobby");
            if allowed {
                controller.restart_lobby();
            }
            let _ = reply.send(allowed);
        }
        MatchCommand::Disconnect { player_id, reply } => {
            let _ = reply.send(controller.disconnect_player(&player_id));
        }
        MatchCommand::ContributeProgression {
            object_id,
            weight,
            reply,
        } => {
            let _ = reply.send(controller.contribute_progression(&object_id, weight));
        }
        MatchCommand::PlayerDeath { player_id, at, reply } => {
            let _ = reply.send(controller.on_player_death(&player_id, at));
        }
        MatchCommand::Hold {
            holder_id,
            target,
            reply,
        } => {
            let _ = reply.send(controller.hold_player(&holder_id, &target));
        }
        MatchCommand::Release { holder_id, reply } => {
            let _ = reply.send(controller.release_hold(&holder_id));
        }
        MatchCommand::Cage { holder_id, reply } => {
            let _ = reply.send(controller.cage_held(&holder_id));
        }
        MatchCommand::AddSearchTask { location, reply } => {
            let _ = reply.send(controller.add_global_search_task(location));
        }
        MatchCommand::Snapshot { reply } => {
            let _ = reply.send(snapshot(controller));
        }
    }
}

fn snapshot<W: MatchWorld>(controller: &PhaseController<W>) -> MatchSnapshot {
    let roster = controller.roster();
    MatchSnapshot {
        phase: controller.phase(),
        players: roster.lobby_view(),
        host_id: roster.host_id().map(str::to_string),
        bots: controller.bots().counts(),
        progress: controller.progress(),
        summary: controller.summary().cloned(),
    }
}
