use std::fs::read_to_string;
use std::path::PathBuf;

use clap::Parser;
use schoolalloc::reference::reference_input;
use schoolalloc::{BigM, CbcSolver, Encoding, Input, RunConfig, Solution, TimeLimit};

#[derive(Parser, Debug)]
#[command(
    name = "schoolalloc",
    version,
    about = "Assign commune student groups to schools at minimal travel cost"
)]
struct Cli {
    /// Problem file in YAML. The built-in reference data set is solved when omitted.
    input: Option<PathBuf>,

    /// Directory for the CSV export, created if missing
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// File name of the CSV export
    #[arg(long)]
    output_file: Option<String>,

    /// Text encoding of the CSV export (utf-8 or latin-1)
    #[arg(long)]
    encoding: Option<Encoding>,

    /// Also write the program in LP format to this path
    #[arg(long)]
    lp_file: Option<PathBuf>,

    /// Wall-clock limit for the solver, in seconds (positive)
    #[arg(long)]
    time_limit: Option<TimeLimit>,

    /// Big-M linking constant: "auto" or a number at least the largest group
    #[arg(long)]
    big_m: Option<BigM>,

    /// Show the solver's own log
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, config: &mut RunConfig) {
        if let Some(dir) = self.output_dir {
            config.export.directory = dir;
        }
        if let Some(file) = self.output_file {
            config.export.file_name = file;
        }
        if let Some(encoding) = self.encoding {
            config.export.encoding = encoding;
        }
        if let Some(lp_file) = self.lp_file {
            config.export.lp_file = Some(lp_file);
        }
        if let Some(limit) = self.time_limit {
            config.solver.time_limit_seconds = Some(limit);
        }
        if let Some(big_m) = self.big_m {
            config.model.big_m = big_m;
        }
        config.solver.verbose |= self.verbose;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut cli = Cli::parse();

    let mut input: Input = match cli.input.take() {
        Some(path) => serde_yaml::from_str(&read_to_string(path)?)?,
        None => {
            log::info!("no input given, solving the reference data set");
            reference_input()
        }
    };
    cli.apply(&mut input.config);

    let solver = CbcSolver::new(&input.config.solver);
    let (allocation, path) = schoolalloc::run(&input, &solver).inspect_err(|e| log::error!("{e}"))?;
    log::info!("allocation written to {}", path.display());

    let solution = Solution {
        solution: allocation,
    };
    println!("{}", serde_yaml::to_string(&solution)?);
    Ok(())
}
