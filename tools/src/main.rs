//! scene-runner: headless driver for the signal-wiring registry.
//!
//! Usage:
//!   scene-runner --scenario scene.json [--config registry.json] [--ticks 20]
//!   scene-runner --churn --seed 12345 --ticks 500
//!   scene-runner --scenario scene.json --ipc-mode

use anyhow::{Context, Result};
use autowire_core::{
    churn::RandomChurn,
    command::{apply_command, CommandOutcome, SceneCommand},
    config::{RegistryConfig, ScenarioConfig, ScenarioStep, RUNNER_EVENT_LOG_CAPACITY},
    declaration::{EntityKind, KindTable, SubscriptionDecl},
    engine::WiringEngine,
    scene::{Delivery, SceneTree},
    snapshot::RegistrySnapshot,
    types::Tick,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    Command { command: SceneCommand },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    tick:        Tick,
    passes:      u64,
    entities:    usize,
    connections: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deliveries:  Vec<Delivery>,
    registry:    RegistrySnapshot,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let churn = args.iter().any(|a| a == "--churn");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let scenario_path = string_arg(&args, "--scenario");
    let config = match string_arg(&args, "--config") {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::default(),
    }
    .with_log_capacity_or(RUNNER_EVENT_LOG_CAPACITY);

    let scenario = match scenario_path {
        Some(path) => ScenarioConfig::load(path)?,
        None => demo_scenario(),
    };
    let ticks = parse_arg(&args, "--ticks", scenario.last_tick().max(1) + 1);

    if !ipc_mode {
        println!("scene-runner");
        println!("  scenario:  {}", scenario_path.unwrap_or("(built-in demo)"));
        println!("  mode:      {}", if churn { "churn" } else { "scripted" });
        println!("  seed:      {seed}");
        println!("  ticks:     {ticks}");
        println!();
    }

    let kinds: KindTable = scenario.kinds.iter().cloned().collect();
    let mut scene = SceneTree::new(&scenario.root_name, kinds.clone());
    scene.set_auto_disconnect(scenario.auto_disconnect);
    let mut engine = WiringEngine::attach(config, &mut scene)?;

    if ipc_mode {
        run_ipc_loop(&mut engine, &mut scene)?;
        return Ok(());
    }

    let mut deliveries = 0usize;
    if churn {
        let mut generator = RandomChurn::new(seed, &kinds);
        let stats = generator.run(&mut engine, &mut scene, ticks, 4)?;
        deliveries = stats.deliveries;
        println!("  churn commands: {}", stats.commands);
    } else {
        for tick in 1..=ticks {
            for step in scenario.steps.iter().filter(|s| s.tick == tick) {
                for command in &step.commands {
                    let outcome = apply_command(&mut engine, &mut scene, command)
                        .with_context(|| format!("tick {tick}: {command:?}"))?;
                    if let CommandOutcome::Delivered(d) = outcome {
                        for delivery in &d {
                            log::info!(
                                "tick={tick} {} -> {}",
                                delivery.subscriber_path.as_deref().unwrap_or("?"),
                                delivery.handler
                            );
                        }
                        deliveries += d.len();
                    }
                }
            }
            engine.tick(&mut scene)?;
        }
    }

    print_summary(&engine, &scene, deliveries);
    Ok(())
}

fn run_ipc_loop(engine: &mut WiringEngine, scene: &mut SceneTree) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let mut deliveries = Vec::new();
        match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => {}
            IpcCommand::Tick { count } => engine.run_ticks(scene, count)?,
            IpcCommand::Command { command } => match apply_command(engine, scene, &command) {
                Ok(CommandOutcome::Delivered(d)) => deliveries = d,
                Ok(_) => {}
                Err(e) => {
                    writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                    stdout.flush()?;
                    continue;
                }
            },
        }
        let state = build_ui_state(engine, scene, deliveries);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(engine: &WiringEngine, scene: &SceneTree, deliveries: Vec<Delivery>) -> UiState {
    UiState {
        tick: engine.current_tick(),
        passes: engine.reconcile_passes(),
        entities: scene.entity_count(),
        connections: scene.connection_count(),
        deliveries,
        registry: engine.snapshot(),
    }
}

fn print_summary(engine: &WiringEngine, scene: &SceneTree, deliveries: usize) {
    let snapshot = engine.snapshot();
    let emitter_records: usize = snapshot.emitters.iter().map(|e| e.paths.len()).sum();

    println!("=== RUN SUMMARY ===");
    println!("  final tick:      {}", engine.current_tick());
    println!("  passes:          {}", engine.reconcile_passes());
    println!("  live entities:   {}", scene.entity_count());
    println!("  emitter records: {emitter_records}");
    println!("  subscriptions:   {}", snapshot.subscriptions.len());
    println!("  connected keys:  {}", snapshot.connected.len());
    println!("  host wires:      {}", scene.connection_count());
    println!("  connect calls:   {}", scene.connect_log().len());
    println!("  disconnects:     {}", scene.disconnect_count());
    println!("  deliveries:      {deliveries}");

    println!();
    println!("=== CONNECTIONS ===");
    if snapshot.connected.is_empty() {
        println!("  (none)");
    } else {
        for key in &snapshot.connected {
            println!("  {key}");
        }
    }
}

/// GameManager and a Player wired to its score signal.
fn demo_scenario() -> ScenarioConfig {
    let add = |name: &str| SceneCommand::Add {
        parent: "/root".into(),
        name:   name.into(),
        kind:   name.into(),
    };
    ScenarioConfig {
        root_name:       "root".into(),
        auto_disconnect: true,
        kinds:           vec![
            EntityKind::new("GameManager").with_signal("score_updated"),
            EntityKind::new("Player").with_subscription(SubscriptionDecl::new(
                "score_updated",
                "/root/GameManager",
                "on_score_updated",
            )),
        ],
        steps:           vec![
            ScenarioStep {
                tick:     1,
                commands: vec![add("Player"), add("GameManager")],
            },
            ScenarioStep {
                tick:     3,
                commands: vec![SceneCommand::Emit {
                    path:  "/root/GameManager".into(),
                    event: "score_updated".into(),
                }],
            },
            ScenarioStep {
                tick:     4,
                commands: vec![SceneCommand::Remove {
                    path: "/root/GameManager".into(),
                }],
            },
        ],
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
