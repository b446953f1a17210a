/*
Entrenamiento offline de gestos EMG

Ruta no adaptativa sobre una sesión ya grabada:
1. Carga una o más grabaciones (label,sample,ch0,...) y extrae características
2. Reserva un 20% de las repeticiones de cada gesto como test
3. Entrena validando contra el test y evalúa ambos lados
4. Exporta el bundle (modelo + preprocesado)

Uso:
     ./target/release/train_offline sujeto01.csv --output sujeto01.json
*/

use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use fgr_trainer::bundle::ModelBundle;
use fgr_trainer::cross_validation::holdout_fit;
use fgr_trainer::csv_loader::{load_recording, recording_to_samples};
use fgr_trainer::feature_extractor::EmgFeatureExtractor;
use fgr_trainer::softmax::SoftmaxClassifier;
use fgr_trainer::types::LabeledSet;
use fgr_trainer::TrainerConfig;

#[derive(Parser, Debug)]
#[command(name = "train_offline", about = "Entrenamiento offline con partición train/test por repetición")]
struct Args {
    /// Grabaciones de la sesión
    #[arg(required = true)]
    recordings: Vec<PathBuf>,

    /// Configuración JSON (preprocesado, hiperparámetros, seed)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fracción de repeticiones por gesto reservada para test
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    /// Bundle de salida
    #[arg(long, default_value = "model.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    println!("🧪 Entrenamiento offline de gestos EMG\n");

    let config = match &args.config {
        Some(path) => TrainerConfig::load(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => TrainerConfig::default(),
    };
    config.validate()?;

    let mut extractor = EmgFeatureExtractor::new(&config.preprocessing);
    let mut data = LabeledSet::new();
    for path in &args.recordings {
        let recording = load_recording(path)?;
        let samples = recording_to_samples(&recording, &config.preprocessing, &mut extractor)?;
        println!(
            "📂 {:?}: {} repeticiones, {} ventanas",
            path,
            recording.repetitions.len(),
            samples.len()
        );
        data.extend(&samples);
    }
    ensure!(!data.is_empty(), "Las grabaciones no contienen ventanas");

    let seed = config.folds.seed;
    let holdout = holdout_fit(
        &SoftmaxClassifier::with_seed(seed),
        &data,
        args.test_fraction,
        &config.hyperparameters,
        seed,
    )?;
    if !holdout.split.train_only.is_empty() {
        println!("⚠️  Sin repeticiones para test: {:?}", holdout.split.train_only);
    }
    println!(
        "\n📊 Train: {} ventanas, precisión {:.2}%",
        holdout.split.train.len(),
        holdout.train_accuracy * 100.0
    );
    println!(
        "📊 Test:  {} ventanas ({} repeticiones), precisión {:.2}%",
        holdout.split.test.len(),
        holdout.split.test_groups.len(),
        holdout.test_accuracy * 100.0
    );

    ModelBundle::new(holdout.model, config.preprocessing.clone())?.save(&args.output)?;
    println!("💾 Modelo exportado a {:?}", args.output);
    Ok(())
}
