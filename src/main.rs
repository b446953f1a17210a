/*
Entrenamiento adaptativo de gestos EMG

Sesión de entrenamiento online sobre bloques ya grabados:
1. Cada bloque (*.csv, formato label,sample,ch0,...) es una ronda de adquisición
2. Tras cada bloque se reentrena con validación cruzada por repetición
3. Cuando la precisión media alcanza el umbral, el siguiente bloque queda como test
4. Ajuste final sobre todos los datos y exportación del modelo

Uso:
     ./target/release/fgr-trainer --blocks grabaciones/sujeto01 --output sujeto01.json

Logs detallados:
     RUST_LOG=debug ./target/release/fgr-trainer --blocks ...
*/

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use fgr_trainer::bundle::ModelBundle;
use fgr_trainer::controller::OnlineTrainer;
use fgr_trainer::cross_validation::CrossValidationTrainer;
use fgr_trainer::csv_loader::CsvBlockSource;
use fgr_trainer::softmax::SoftmaxClassifier;
use fgr_trainer::TrainerConfig;

#[derive(Parser, Debug)]
#[command(name = "fgr-trainer", version, about = "Entrenamiento adaptativo de gestos EMG")]
struct Args {
    /// Directorio con los bloques grabados, uno por ronda de adquisición
    #[arg(long)]
    blocks: PathBuf,

    /// Configuración JSON (los campos ausentes toman su valor por defecto)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bundle de salida (modelo + preprocesado)
    #[arg(long, default_value = "model.json")]
    output: PathBuf,

    /// Informe JSON de la sesión
    #[arg(long)]
    report: Option<PathBuf>,

    /// Sobrescribe el umbral de parada
    #[arg(long)]
    threshold: Option<f64>,

    /// Sobrescribe la espera del rol de entrenamiento (ms)
    #[arg(long)]
    poll_ms: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    println!("🎯 Entrenamiento adaptativo de gestos EMG\n");

    let mut config = match &args.config {
        Some(path) => TrainerConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => TrainerConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.stop_threshold = threshold;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.poll_interval_ms = poll_ms;
    }

    let source = CsvBlockSource::from_dir(&args.blocks, config.preprocessing.clone())?;
    println!("📂 {} bloques grabados en {:?}", source.remaining(), args.blocks);
    println!(
        "🎚️  Umbral de parada: {:.0}%\n",
        config.stop_threshold * 100.0
    );

    let trainer = CrossValidationTrainer::new(
        SoftmaxClassifier::with_seed(config.folds.seed),
        config.hyperparameters.clone(),
        config.folds.seed,
    );

    let session = OnlineTrainer::new(config.clone()).on_round(|round| {
        println!(
            "📈 Run {} · {} folds · precisión media {:.2}%",
            round.run_count,
            round.folds,
            round.mean_accuracy * 100.0
        );
        if !round.discarded.is_empty() {
            println!("⚠️  Gestos excluidos de la ronda: {:?}", round.discarded);
        }
    });

    let outcome = match session.run(source, trainer) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("❌ La sesión terminó con error: {}", e);
            return Err(e.into());
        }
    };

    let report = &outcome.report;
    let Some(final_accuracy) = report.final_accuracy else {
        bail!(
            "La sesión terminó sin alcanzar el umbral ({} rondas)",
            report.rounds.len()
        );
    };
    println!(
        "\n🥇 Modelo final: {} runs, precisión en test {:.2}% ({} ventanas reservadas)",
        report.runs_collected,
        final_accuracy * 100.0,
        report.held_out_size
    );

    let Some(model) = outcome.trainer.into_final_model() else {
        bail!("El entrenador no conservó el modelo final");
    };
    ModelBundle::new(model, config.preprocessing.clone())?.save(&args.output)?;
    println!("💾 Modelo exportado a {:?}", args.output);

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&outcome.report)?)
            .with_context(|| format!("No se pudo escribir el informe {:?}", path))?;
        println!("📝 Informe de la sesión en {:?}", path);
    }

    Ok(())
}
