use clap::Parser;
use meowphone_match_server::config::{MatchConfig, ReadinessPolicy};
use meowphone_match_server::controller::{CageOutcome, PhaseController};
use meowphone_match_server::logging::{init_logging, LogFormat};
use meowphone_match_server::rng::Rng;
use meowphone_match_server::roster::ParticipantId;
use meowphone_match_server::sim::SimWorld;
use meowphone_match_server::types::{MatchEvent, MatchPhase, Team, Transform, WinReason};
use meowphone_match_server::world::MatchWorld;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    players: Option<usize>,
    #[arg(long)]
    gameplay_secs: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    /// TOML match config used as the base of every scenario.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

/// Per-second odds of each scripted action during gameplay.
#[derive(Clone, Copy, Debug, Default, Serialize)]
struct Script {
    #[serde(rename = "pushChance")]
    push_chance: f32,
    #[serde(rename = "captureChance")]
    capture_chance: f32,
    #[serde(rename = "deathChance")]
    death_chance: f32,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    players: usize,
    #[serde(rename = "humanBots")]
    human_bots: usize,
    #[serde(rename = "catBots")]
    cat_bots: usize,
    #[serde(rename = "gameplaySecs")]
    gameplay_secs: u32,
    seed: u32,
    script: Script,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    players: usize,
    #[serde(rename = "gameplaySecs")]
    gameplay_secs: u32,
    winner: Team,
    reason: WinReason,
    #[serde(rename = "elapsedSecs")]
    elapsed_secs: u32,
    #[serde(rename = "progressionPercent")]
    progression_percent: f32,
    #[serde(rename = "capturePercent")]
    capture_percent: f32,
    contributions: u32,
    captures: u32,
    deaths: u32,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageElapsedSecs")]
    average_elapsed_secs: u32,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Debug, Default)]
struct ScriptStats {
    contributions: u32,
    captures: u32,
    deaths: u32,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    let base = match cli.config.as_deref() {
        Some(path) => match MatchConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path.display(), %err, "failed to load match config");
                std::process::exit(2);
            }
        },
        None => MatchConfig::default(),
    };

    let scenarios = resolve_scenarios(&cli, &base);
    let started_at = chrono::Utc::now();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, started_at.timestamp_millis()));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_elapsed_secs = 0u32;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            players = scenario.players,
            gameplay_secs = scenario.gameplay_secs,
            "scenario started"
        );
        let scenario_run = match run_scenario(&base, &scenario) {
            Ok(run) => run,
            Err(err) => {
                error!(scenario = %scenario.name, %err, "scenario config rejected");
                std::process::exit(2);
            }
        };

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                %match_id,
                scenario = %scenario.name,
                tick = anomaly.tick,
                detail = %anomaly.message,
                "anomaly detected"
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_elapsed_secs += scenario_run.result.elapsed_secs;
        *reason_counts
            .entry(win_reason_key(scenario_run.result.reason).to_string())
            .or_insert(0) += 1;

        info!(
            %match_id,
            scenario = %scenario.name,
            tick = scenario_run.finished_tick,
            winner = ?scenario_run.result.winner,
            reason = win_reason_key(scenario_run.result.reason),
            elapsed_secs = scenario_run.result.elapsed_secs,
            "scenario finished"
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(err) => error!(%err, "scenario result not serialisable"),
        }
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        started_at.to_rfc3339(),
        chrono::Utc::now().to_rfc3339(),
        scenario_results,
        reason_counts,
        total_anomalies,
        total_elapsed_secs,
    );

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), %err, "summary write failed");
            std::process::exit(2);
        }
    }

    info!(
        %match_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_elapsed_secs = summary.average_elapsed_secs,
        summary_out = ?cli.summary_out,
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(
    base: &MatchConfig,
    scenario: &Scenario,
) -> Result<ScenarioRunResult, meowphone_match_server::error::ConfigError> {
    let readiness_policy = if scenario.players < 2 {
        ReadinessPolicy::DebugSinglePlayer
    } else {
        base.readiness_policy
    };
    let config = MatchConfig {
        seed: Some(scenario.seed),
        gameplay_secs: scenario.gameplay_secs,
        initial_human_bots: scenario.human_bots,
        initial_cat_bots: scenario.cat_bots,
        readiness_policy,
        ..base.clone()
    };
    config.validate()?;
    let tick_limit = u64::from(
        config.ready_secs + config.customize_secs + config.prepare_secs + config.gameplay_secs,
    ) + 10;

    let mut controller = PhaseController::new(config, SimWorld::furnished(scenario.seed));
    let mut rng = Rng::new(scenario.seed ^ 0x5eed_cafe);
    for idx in 0..scenario.players {
        controller.join_player(&format!("sim_{}", idx + 1), &format!("Sim-{:02}", idx + 1));
    }
    for player_id in controller.roster().ids() {
        controller.set_player_ready(&player_id, true);
    }

    let mut stats = ScriptStats::default();
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut ended_signals = 0;
    let mut tick = 0u64;

    while controller.phase() != MatchPhase::Ended {
        controller.tick();
        tick += 1;
        if controller.phase() == MatchPhase::Gameplay {
            play_second(&mut controller, &scenario.script, &mut rng, &mut stats);
        }

        for event in controller.drain_events() {
            let message = match event {
                MatchEvent::MatchEnded { .. } => {
                    ended_signals += 1;
                    (ended_signals > 1).then(|| "match ended more than once".to_string())
                }
                MatchEvent::ProgressUpdated { progress } => {
                    let valid = |p: f32| p.is_finite() && (0.0..=1.0).contains(&p);
                    (!valid(progress.progression_percent) || !valid(progress.capture_percent)).then(|| {
                        format!(
                            "progress out of range: {} / {}",
                            progress.progression_percent, progress.capture_percent
                        )
                    })
                }
                _ => None,
            };
            if let Some(message) = message {
                push_anomaly(&mut anomalies, &mut anomaly_records, &mut anomaly_seen, tick, message);
            }
        }

        if tick > tick_limit {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }
    }

    let (winner, reason, elapsed_secs, progression_percent, capture_percent) = match controller.summary() {
        Some(summary) => (
            summary.outcome.winner,
            summary.outcome.reason,
            summary.elapsed_secs,
            summary.progression_percent,
            summary.capture_percent,
        ),
        None => {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                tick,
                "no summary after match".to_string(),
            );
            (Team::None, WinReason::TimeoutTie, 0, 0.0, 0.0)
        }
    };

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            players: scenario.players,
            gameplay_secs: scenario.gameplay_secs,
            winner,
            reason,
            elapsed_secs,
            progression_percent: (progression_percent * 1000.0).round() / 10.0,
            capture_percent: (capture_percent * 1000.0).round() / 10.0,
            contributions: stats.contributions,
            captures: stats.captures,
            deaths: stats.deaths,
            anomalies,
        },
        anomaly_records,
        finished_tick: tick,
    })
}

/// One simulated second of player behaviour.
fn play_second(controller: &mut PhaseController<SimWorld>, script: &Script, rng: &mut Rng, stats: &mut ScriptStats) {
    if rng.bool(script.push_chance) {
        let pushables: Vec<(String, f32)> = controller
            .world()
            .map(|world| {
                world
                    .env_objects()
                    .into_iter()
                    .filter_map(|object| object.weight.map(|weight| (object.id, weight)))
                    .collect()
            })
            .unwrap_or_default();
        if !pushables.is_empty() {
            let (object_id, weight) = &pushables[rng.pick_index(pushables.len())];
            if controller.contribute_progression(object_id, *weight) {
                stats.contributions += 1;
            }
        }
    }

    if controller.phase() == MatchPhase::Gameplay && rng.bool(script.capture_chance) {
        let hunters = alive_players(controller, Team::CAPTURE, false);
        let targets = alive_players(controller, Team::PROGRESSION, true);
        if !hunters.is_empty() && !targets.is_empty() {
            let holder = &hunters[rng.pick_index(hunters.len())];
            let target = ParticipantId::player(targets[rng.pick_index(targets.len())].clone());
            if controller.hold_player(holder, &target) && controller.cage_held(holder) == Some(CageOutcome::Captured) {
                stats.captures += 1;
            }
        }
    }

    if controller.phase() == MatchPhase::Gameplay && rng.bool(script.death_chance) {
        let victims = alive_players(controller, Team::CAPTURE, false);
        if !victims.is_empty() {
            let victim = &victims[rng.pick_index(victims.len())];
            if controller.on_player_death(victim, Transform::default()) {
                stats.deaths += 1;
            }
        }
    }
}

fn alive_players(controller: &PhaseController<SimWorld>, team: Team, skip_captured: bool) -> Vec<String> {
    controller
        .roster()
        .iter()
        .filter(|player| player.team == team && !player.is_died)
        .filter(|player| !(skip_captured && player.is_captured))
        .map(|player| player.id.clone())
        .collect()
}

fn resolve_scenarios(cli: &Cli, base: &MatchConfig) -> Vec<Scenario> {
    let seed = normalize_seed(
        cli.seed
            .or_else(|| base.seed.map(u64::from))
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().unsigned_abs()),
    );
    let gameplay_secs = cli.gameplay_secs.unwrap_or(base.gameplay_secs).clamp(1, 3_600);

    if cli.single || cli.players.is_some() {
        let players = cli.players.unwrap_or(4).clamp(1, 32);
        return vec![Scenario {
            name: format!("custom-p{players}"),
            players,
            human_bots: base.initial_human_bots,
            cat_bots: base.initial_cat_bots,
            gameplay_secs,
            seed,
            script: Script {
                push_chance: 0.2,
                capture_chance: 0.15,
                death_chance: 0.03,
            },
        }];
    }

    vec![
        Scenario {
            name: "idle-timeout-p4".to_string(),
            players: 4,
            human_bots: 0,
            cat_bots: 0,
            gameplay_secs,
            seed,
            script: Script::default(),
        },
        Scenario {
            name: "pushers-p4".to_string(),
            players: 4,
            human_bots: 0,
            cat_bots: 0,
            gameplay_secs,
            seed: normalize_seed(u64::from(seed) + 1),
            script: Script {
                push_chance: 0.5,
                ..Script::default()
            },
        },
        Scenario {
            name: "hunters-p5".to_string(),
            players: 5,
            human_bots: 1,
            cat_bots: 1,
            gameplay_secs,
            seed: normalize_seed(u64::from(seed) + 2),
            script: Script {
                capture_chance: 0.3,
                ..Script::default()
            },
        },
        Scenario {
            name: "brawl-p6".to_string(),
            players: 6,
            human_bots: 2,
            cat_bots: 2,
            gameplay_secs,
            seed: normalize_seed(u64::from(seed) + 3),
            script: Script {
                push_chance: 0.2,
                capture_chance: 0.15,
                death_chance: 0.05,
            },
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: i64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at: String,
    finished_at: String,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_elapsed_secs: u32,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_elapsed_secs = if scenario_count == 0 {
        0
    } else {
        total_elapsed_secs / scenario_count as u32
    };
    RunSummary {
        match_id,
        started_at,
        finished_at,
        scenario_count,
        anomaly_count,
        average_elapsed_secs,
        reason_counts,
        scenarios,
    }
}

fn win_reason_key(reason: WinReason) -> &'static str {
    match reason {
        WinReason::ProgressionReached => "progression_reached",
        WinReason::TargetsCaptured => "targets_captured",
        WinReason::CaptureTeamEliminated => "capture_team_eliminated",
        WinReason::TimeoutProgressionAhead => "timeout_progression_ahead",
        WinReason::TimeoutCaptureAhead => "timeout_capture_ahead",
        WinReason::TimeoutTie => "timeout_tie",
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(reason: WinReason, elapsed_secs: u32) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            players: 4,
            gameplay_secs: 60,
            winner: Team::Cat,
            reason,
            elapsed_secs,
            progression_percent: 0.0,
            capture_percent: 0.0,
            contributions: 0,
            captures: 0,
            deaths: 0,
            anomalies: Vec::new(),
        }
    }

    fn quick_scenario(players: usize, script: Script) -> Scenario {
        Scenario {
            name: "test".to_string(),
            players,
            human_bots: 1,
            cat_bots: 1,
            gameplay_secs: 20,
            seed: 11,
            script,
        }
    }

    fn quick_base() -> MatchConfig {
        MatchConfig {
            ready_secs: 1,
            customize_secs: 1,
            prepare_secs: 1,
            ..MatchConfig::default()
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_elapsed() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            "2026-01-01T00:00:00+00:00".to_string(),
            "2026-01-01T00:00:05+00:00".to_string(),
            vec![
                make_scenario_result(WinReason::TimeoutTie, 60),
                make_scenario_result(WinReason::ProgressionReached, 30),
            ],
            BTreeMap::from([
                ("timeout_tie".to_string(), 1usize),
                ("progression_reached".to_string(), 1usize),
            ]),
            0,
            90,
        );
        assert_eq!(summary.average_elapsed_secs, 45);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let now = chrono::Utc::now().timestamp_millis();
        let target = std::env::temp_dir()
            .join(format!("meowphone-missing-{now}"))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            String::new(),
            String::new(),
            vec![make_scenario_result(WinReason::TimeoutTie, 60)],
            BTreeMap::from([("timeout_tie".to_string(), 1usize)]),
            0,
            60,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same anomaly".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same anomaly".to_string());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn idle_scenario_times_out_as_a_tie() {
        let run = run_scenario(&quick_base(), &quick_scenario(4, Script::default())).expect("valid config");
        assert_eq!(run.result.reason, WinReason::TimeoutTie);
        assert_eq!(run.result.winner, Team::Cat);
        assert_eq!(run.result.elapsed_secs, 20);
        assert!(run.result.anomalies.is_empty());
    }

    #[test]
    fn scripted_scenarios_are_deterministic_per_seed() {
        let script = Script {
            push_chance: 0.3,
            capture_chance: 0.2,
            death_chance: 0.05,
        };
        let first = run_scenario(&quick_base(), &quick_scenario(6, script)).expect("valid config");
        let second = run_scenario(&quick_base(), &quick_scenario(6, script)).expect("valid config");
        assert_eq!(first.result.reason, second.result.reason);
        assert_eq!(first.result.elapsed_secs, second.result.elapsed_secs);
        assert_eq!(first.result.contributions, second.result.contributions);
        assert_eq!(first.result.captures, second.result.captures);
        assert!(first.result.anomalies.is_empty());
    }

    #[test]
    fn relentless_hunters_capture_every_target() {
        let script = Script {
            capture_chance: 1.0,
            ..Script::default()
        };
        let run = run_scenario(&quick_base(), &quick_scenario(4, script)).expect("valid config");
        assert_eq!(run.result.reason, WinReason::TargetsCaptured);
        assert_eq!(run.result.winner, Team::Human);
        assert_eq!(run.result.captures, 2);
    }

    #[test]
    fn invalid_scenario_config_is_reported() {
        let mut scenario = quick_scenario(2, Script::default());
        scenario.gameplay_secs = 0;
        assert!(run_scenario(&quick_base(), &scenario).is_err());
    }
}
