//! outlet-shed entry point: CLI wiring, fleet simulation and live mode.

use std::net::Ipv4Addr;
use std::path::Path;
use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use outlet_shed::config::ScenarioConfig;
use outlet_shed::devices::{Outlet, SyntheticProbe};
use outlet_shed::io::export::export_csv;
use outlet_shed::net::console::StdinConsole;
use outlet_shed::net::snapshot::NodeId;
use outlet_shed::net::udp::UdpTransport;
use outlet_shed::sim::clock::{ClockSource, SystemClock};
use outlet_shed::sim::control::{CancelToken, ControlLoop};
use outlet_shed::sim::engine::FleetEngine;
use outlet_shed::sim::kpi::FleetKpis;
use outlet_shed::sim::node::OutletNode;

/// Default UDP port shared by live outlets.
const DEFAULT_UDP_PORT: u16 = 47_000;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    cycles_override: Option<u64>,
    telemetry_out: Option<String>,
    live: Option<u16>,
    udp_port: u16,
    subnet: Ipv4Addr,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("outlet-shed: peer-coordinated load shedding for smart outlets");
    eprintln!();
    eprintln!("Usage: outlet-shed [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset ({})", ScenarioConfig::PRESETS.join(", "));
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --cycles <u64>           Override number of simulated cycles");
    eprintln!("  --telemetry-out <path>   Export cycle records to CSV");
    eprintln!("  --live <id>              Run outlet <id> of the scenario against UDP and stdin");
    eprintln!("  --udp-port <u16>         UDP port for live mode (default: {DEFAULT_UDP_PORT})");
    eprintln!("  --subnet <ipv4>          Base address for unicast in live mode (default: 192.168.0.0)");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after simulation");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

/// Returns the value following flag `args[*i]`, or exits with an error.
fn value<'a>(args: &'a [String], i: &mut usize, what: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(v) => v,
        None => {
            eprintln!("error: {} requires {what}", args[*i - 1]);
            process::exit(1);
        }
    }
}

fn parsed<T: std::str::FromStr>(raw: &str, flag: &str, kind: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not a valid {kind}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        cycles_override: None,
        telemetry_out: None,
        live: None,
        udp_port: DEFAULT_UDP_PORT,
        subnet: Ipv4Addr::new(192, 168, 0, 0),
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(value(&args, &mut i, "a path argument").into()),
            "--preset" => cli.preset = Some(value(&args, &mut i, "a name argument").into()),
            "--seed" => {
                cli.seed_override = Some(parsed(value(&args, &mut i, "a u64 argument"), "--seed", "u64"));
            }
            "--cycles" => {
                cli.cycles_override =
                    Some(parsed(value(&args, &mut i, "a u64 argument"), "--cycles", "u64"));
            }
            "--telemetry-out" => {
                cli.telemetry_out = Some(value(&args, &mut i, "a path argument").into());
            }
            "--live" => cli.live = Some(parsed(value(&args, &mut i, "an outlet id"), "--live", "u16")),
            "--udp-port" => {
                cli.udp_port = parsed(value(&args, &mut i, "a u16 argument"), "--udp-port", "u16");
            }
            "--subnet" => {
                cli.subnet = parsed(value(&args, &mut i, "an IPv4 address"), "--subnet", "IPv4 address");
            }
            #[cfg(feature = "api")]
            "--serve" => cli.serve = true,
            #[cfg(feature = "api")]
            "--port" => cli.port = parsed(value(&args, &mut i, "a u16 argument"), "--port", "u16"),
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_scenario(cli: &CliArgs) -> ScenarioConfig {
    // --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }
    if let Some(cycles) = cli.cycles_override {
        scenario.simulation.cycles = cycles;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    scenario
}

fn run_live(scenario: &ScenarioConfig, id: u16, cli: &CliArgs) {
    let Some(outlet) = scenario.outlet(id) else {
        eprintln!("error: scenario has no outlet with id {id}");
        process::exit(1);
    };
    let settings = scenario.node_settings(outlet).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    let transport = UdpTransport::bind(NodeId(id), cli.udp_port, cli.subnet).unwrap_or_else(|e| {
        eprintln!("error: cannot bind UDP port {}: {e}", cli.udp_port);
        process::exit(1);
    });

    let clock = SystemClock::new();
    let node = OutletNode::new(
        settings,
        Outlet::new(NodeId(id), outlet.dimmable),
        SyntheticProbe::new(
            outlet.base_kw,
            outlet.amp_kw,
            outlet.phase_rad,
            outlet.noise_std,
            outlet.seed(scenario.simulation.seed),
        ),
        clock.now(),
    );
    info!(outlet = id, port = cli.udp_port, "live mode started");
    let mut control = ControlLoop::new(
        node,
        clock,
        transport,
        StdinConsole::spawn(),
        scenario.loop_timing(),
        CancelToken::new(),
    );
    let cycles = control.run();
    info!(cycles, "live mode stopped");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let scenario = load_scenario(&cli);

    if let Some(id) = cli.live {
        run_live(&scenario, id, &cli);
        return;
    }

    let mut engine = FleetEngine::from_config(&scenario).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    let records = engine.run();
    let kpis = FleetKpis::from_records(&records, engine.command_stats().relayed);

    for r in &records {
        println!("{r}");
    }
    println!("\n{kpis}");

    if let Some(ref path) = cli.telemetry_out {
        if let Err(e) = export_csv(&records, Path::new(path)) {
            error!(error = %e, "failed to write CSV");
            process::exit(1);
        }
        info!(path = %path, "telemetry written");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(outlet_shed::api::AppState {
            config: scenario,
            kpis,
            records,
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(outlet_shed::api::serve(state, addr)) {
            error!(%addr, error = %e, "API server failed");
            process::exit(1);
        }
    }
}
