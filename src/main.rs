//! Solar credit settlement entry point: CLI wiring and config-driven runs.

use std::path::Path;
use std::process;

use tracing_subscriber::EnvFilter;

use solar_credits::config::ScenarioConfig;
use solar_credits::io::export::{export_allocations_csv, export_monthly_csv};
use solar_credits::io::ledger_store::{load_ledger, save_ledger};
use solar_credits::model::tariff_flag::TariffFlag;
use solar_credits::settlement::types::{AnnualSettlement, MonthlySettlement};

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    flag_override: Option<TariffFlag>,
    year_override: Option<i32>,
    years_override: Option<u32>,
    ledger_in: Option<String>,
    ledger_out: Option<String>,
    csv_out: Option<String>,
    allocations_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("solar-credits: credit banking and settlement for a shared solar plant");
    eprintln!();
    eprintln!("Usage: solar-credits [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>          Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>            Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --flag <flag>              Tariff flag (none, yellow, red_1, red_2, scarcity)");
    eprintln!("  --year <i32>               First year to settle");
    eprintln!("  --years <u32>              Number of consecutive years to settle");
    eprintln!("  --ledger-in <path>         Resume from a saved credit ledger (JSON)");
    eprintln!("  --ledger-out <path>        Save the credit ledger after the run (JSON)");
    eprintln!("  --csv-out <path>           Export monthly results to CSV");
    eprintln!("  --allocations-out <path>   Export per-unit allocations to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                    Start REST API server after the run");
        eprintln!("  --port <u16>               API server port (default: 3000)");
    }
    eprintln!("  --help                     Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the example preset is used.");
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=debug) to control log output on stderr.");
}

/// Returns the value following option `name`, or exits with an error.
fn value_of(args: &[String], i: &mut usize, name: &str, kind: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {name} requires a {kind} argument");
        process::exit(1);
    }
    args[*i].clone()
}

/// Parses the value following option `name`, or exits with an error.
fn parsed_value_of<T: std::str::FromStr>(
    args: &[String],
    i: &mut usize,
    name: &str,
    kind: &str,
) -> T {
    let raw = value_of(args, i, name, kind);
    raw.parse::<T>().unwrap_or_else(|_| {
        eprintln!("error: {name} value \"{raw}\" is not a valid {kind}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        flag_override: None,
        year_override: None,
        years_override: None,
        ledger_in: None,
        ledger_out: None,
        csv_out: None,
        allocations_out: None,
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
            "--scenario" => cli.scenario_path = Some(value_of(&args, &mut i, "--scenario", "path")),
            "--preset" => cli.preset = Some(value_of(&args, &mut i, "--preset", "name")),
            "--flag" => {
                cli.flag_override = Some(parsed_value_of(&args, &mut i, "--flag", "tariff flag"));
            }
            "--year" => cli.year_override = Some(parsed_value_of(&args, &mut i, "--year", "i32")),
            "--years" => {
                cli.years_override = Some(parsed_value_of(&args, &mut i, "--years", "u32"));
            }
            "--ledger-in" => cli.ledger_in = Some(value_of(&args, &mut i, "--ledger-in", "path")),
            "--ledger-out" => {
                cli.ledger_out = Some(value_of(&args, &mut i, "--ledger-out", "path"));
            }
            "--csv-out" => cli.csv_out = Some(value_of(&args, &mut i, "--csv-out", "path")),
            "--allocations-out" => {
                cli.allocations_out = Some(value_of(&args, &mut i, "--allocations-out", "path"));
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => cli.port = parsed_value_of(&args, &mut i, "--port", "u16"),
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

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn main() {
    let cli = parse_args();
    init_tracing();

    // Load config: --scenario takes priority, then --preset, then the example
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path)).unwrap_or_else(|e| fail(e))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name).unwrap_or_else(|e| fail(e))
    } else {
        ScenarioConfig::example()
    };

    if let Some(flag) = cli.flag_override {
        scenario.settlement.flag = flag;
    }
    if let Some(year) = cli.year_override {
        scenario.settlement.start_year = year;
    }
    if let Some(years) = cli.years_override {
        scenario.settlement.years = years;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let ledger = cli.ledger_in.as_ref().map(|path| {
        load_ledger(Path::new(path), scenario.system.credit_validity_months)
            .unwrap_or_else(|e| fail(e))
    });

    let mut run = scenario.build_run(ledger).unwrap_or_else(|e| fail(e));
    let years: Vec<AnnualSettlement> = run
        .run_years(scenario.settlement.start_year, scenario.settlement.years)
        .unwrap_or_else(|e| fail(e));

    for year in &years {
        for m in &year.months {
            println!("{m}");
        }
        println!("\n{year}\n");
    }

    let months: Vec<MonthlySettlement> = years.iter().flat_map(|y| y.months.clone()).collect();

    if let Some(ref path) = cli.csv_out {
        if let Err(e) = export_monthly_csv(&months, Path::new(path)) {
            fail(format!("failed to write CSV: {e}"));
        }
        eprintln!("Monthly results written to {path}");
    }
    if let Some(ref path) = cli.allocations_out {
        if let Err(e) = export_allocations_csv(&months, Path::new(path)) {
            fail(format!("failed to write CSV: {e}"));
        }
        eprintln!("Allocations written to {path}");
    }
    if let Some(ref path) = cli.ledger_out {
        if let Err(e) = save_ledger(run.ledger(), Path::new(path)) {
            fail(format!("failed to save ledger: {e}"));
        }
        eprintln!("Ledger written to {path}");
    }

    // Start API server if requested
    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(solar_credits::api::AppState {
            scenario,
            years,
            ledger: run.into_ledger(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new()
            .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));
        if let Err(e) = rt.block_on(solar_credits::api::serve(state, addr)) {
            fail(format!("server error: {e}"));
        }
    }
}
