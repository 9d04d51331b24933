//! Command-line entry point: run the full risk pipeline on a CSV and write
//! the predictions table and JSON report next to it.
use std::path::PathBuf;
use std::process::exit;

use agrorisk::{JsonIO, PipelineConfig, RiskError, RiskPipeline};

fn usage() -> ! {
    eprintln!("usage: agrorisk <input.csv> [output-dir] [--config <pipeline.json>]");
    exit(2);
}

fn parse_args() -> (PathBuf, PathBuf, Option<PathBuf>) {
    let mut positional: Vec<String> = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(p) => config_path = Some(PathBuf::from(p)),
                None => usage(),
            },
            "--help" | "-h" => usage(),
            _ => positional.push(arg),
        }
    }
    let input = match positional.first() {
        Some(p) => PathBuf::from(p),
        None => usage(),
    };
    let out_dir = positional
        .get(1)
        .map(PathBuf::from)
        .or_else(|| input.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    (input, out_dir, config_path)
}

fn run(input: &PathBuf, out_dir: &PathBuf, config_path: Option<&PathBuf>) -> Result<(), RiskError> {
    let cfg = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let pipeline = RiskPipeline::new(cfg)?;
    let report = pipeline.run_csv_path(input)?;

    std::fs::create_dir_all(out_dir).map_err(|e| RiskError::UnableToWrite(e.to_string()))?;
    let predictions_path = out_dir.join("predictions.csv");
    let report_path = out_dir.join("report.json");
    report.save_predictions_csv(&predictions_path)?;
    report.save(&report_path)?;

    println!("rows scored     {}", report.observed.len());
    println!("rmse            {}", report.rmse);
    println!("r2              {}", report.r2);
    println!("picp            {}", report.picp);
    println!("sharpness       {}", report.sharpness);
    println!("cwt             {}", report.cwt);
    println!("crps            {}", report.crps);
    println!("var 99          {}", report.var_99);
    println!("cvar 99         {}", report.cvar_99);
    println!(
        "gev (shape, loc, scale)  ({:.4}, {:.4}, {:.4})",
        report.gev_params.shape, report.gev_params.loc, report.gev_params.scale
    );
    println!(
        "gpd (shape, scale)       ({:.4}, {:.4}) above threshold {:.4}",
        report.pot_params.shape, report.pot_params.scale, report.threshold
    );
    for effect in &report.region_ate {
        println!("ate {:<12} {:.4}", effect.region, effect.ate);
    }
    println!("wrote {}", predictions_path.display());
    println!("wrote {}", report_path.display());
    Ok(())
}

fn main() {
    let (input, out_dir, config_path) = parse_args();
    if let Err(e) = run(&input, &out_dir, config_path.as_ref()) {
        eprintln!("error: {}", e);
        exit(1);
    }
}
