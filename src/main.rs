use benchlog_profiler::Result;
use benchlog_profiler::batch::ExperimentSet;
use benchlog_profiler::fuse;
use benchlog_profiler::options::Options;

use clap::{Parser, Subcommand};
use std::io::Write;

#[derive(Parser)]
#[command(name = "benchlog-viz")]
#[command(about = "Storage-benchmark experiment log profiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    /// Option assignments, e.g. -s w_labels=idle,burst (repeatable).
    #[arg(short = 's', long = "set", global = true)]
    set: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse a log onto one timeline and emit the table plus the pressure
    /// summary.
    Report {
        /// Experiment log (*.out, optionally .gz/.xz/.lzma).
        #[arg(long)]
        file: String,

        /// Write the fused table as CSV to this path instead of stdout.
        #[arg(short = 'o', long)]
        csv: Option<String>,
    },
    /// Per-task sample counts and sampling-interval statistics.
    Diagnostics {
        #[arg(long)]
        file: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut options = Options::default();
    options.apply_all(cli.set.iter().map(String::as_str))?;

    match cli.cmd {
        Commands::Report { file, csv } => report(&file, csv.as_deref(), options),
        Commands::Diagnostics { file } => diagnostics(&file, options),
    }
}

fn report(path: &str, csv: Option<&str>, options: Options) -> Result<()> {
    let print_params = options.print_params;
    let print_pressure = options.print_pressure;

    let mut batch = ExperimentSet::new("report", options);
    let file = batch.add_file(path.as_ref())?;

    if print_params {
        println!("Params:");
        let width = file.params().iter().map(|(k, _)| k.len()).max().unwrap_or(20);
        for (name, value) in file.params().iter() {
            println!("  {:<width$} : {}", name, value, width = width);
        }
        println!();
    }

    let label = file.file_label().to_string();
    let Some(table) = file.fused_table() else {
        println!("no usable data in {}", path);
        return Ok(());
    };

    match csv {
        Some(out_path) => {
            let mut out = std::fs::File::create(out_path)?;
            table.write_csv(&mut out)?;
            println!("Wrote {} ({} rows)", out_path, table.len());
        }
        None => {
            let mut out = std::io::stdout().lock();
            table.write_csv(&mut out)?;
            out.flush()?;
        }
    }

    if let Some(data) = file.pressure_data()? {
        println!();
        println!("Pressure summary for {} ({})", path, label);
        println!("  baseline w0 mean throughput: {:.3}", data.w0);
        for (i, record) in data.records.iter().enumerate() {
            println!(
                "  {:<8} start={:<6} mean={:<12.3} normalized={:.3}",
                record.w_name, data.times[i], record.mean_throughput, record.normalized,
            );
        }
        if print_pressure {
            let values: Vec<String> = data
                .w_normalized
                .iter()
                .enumerate()
                .map(|(i, v)| format!("{}={:.3}", data.w_names[i], v))
                .collect();
            println!("  normalized: {}", values.join(", "));
        }
    }

    Ok(())
}

fn diagnostics(path: &str, options: Options) -> Result<()> {
    let mut batch = ExperimentSet::new("diagnostics", options);
    let file = batch.add_file(path.as_ref())?;

    println!("Data diagnostics from file: {}", path);

    println!("  Sample counts:");
    let table_len = file.fused_table().map(fuse::FusedTable::len).unwrap_or(0);
    println!("    fused table = {}", table_len);
    let names: Vec<String> = file.tasks().names().map(str::to_string).collect();
    for name in &names {
        let count = file.tasks().get(name).map(Vec::len).unwrap_or(0);
        println!("    {} = {}", name, count);
    }

    let expected = file.stats_interval();
    println!("  Stats interval (expected {}):", expected);
    for name in &names {
        let times = file.task_times(name);
        match fuse::interval_stats(&times, expected) {
            Some(stats) => println!(
                "    {}: gaps = {}; mean interval = {:.3}; repeated = {}",
                name, stats.gaps, stats.mean_interval, stats.repeated
            ),
            None => println!("    {}: insufficient data", name),
        }
    }

    Ok(())
}
