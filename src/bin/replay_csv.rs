use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use fgr_trainer::bundle::ModelBundle;
use fgr_trainer::config::PredictorConfig;
use fgr_trainer::csv_loader::load_recording;
use fgr_trainer::feature_extractor::EmgFeatureExtractor;
use fgr_trainer::stream::{channel, WindowedStream};
use fgr_trainer::{RealTimePredictor, TrainerError, Vote};

#[derive(Parser, Debug)]
#[command(name = "replay_csv", about = "Reproduce una grabación EMG a través del predictor en tiempo real")]
struct Args {
    /// Bundle exportado por fgr-trainer
    #[arg(long, default_value = "model.json")]
    model: PathBuf,

    /// Grabación a reproducir (label,sample,ch0,...)
    recording: PathBuf,

    /// Ventanas por votación
    #[arg(long, default_value_t = 10)]
    vote_over: usize,

    /// Reproducir a la frecuencia de muestreo real en lugar de lo más rápido posible
    #[arg(long)]
    realtime: bool,

    /// Imprimir también los votos "loading"
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    println!("🎞️  Reproduciendo {:?}", args.recording);

    let bundle: ModelBundle = ModelBundle::load(&args.model)
        .with_context(|| format!("No se pudo cargar el modelo {:?}", args.model))?;
    println!("✅ Modelo cargado ({}): {:?}", bundle.created_with, bundle.class_names);

    let recording = load_recording(&args.recording)?;
    println!(
        "📊 {} repeticiones, {} muestras, {} canales\n",
        recording.repetitions.len(),
        recording.len(),
        recording.channels
    );

    let preprocessing = bundle.preprocessing.clone();
    let sample_period = sample_period(preprocessing.sample_rate)?;
    let config = PredictorConfig {
        vote_over: args.vote_over,
        ..PredictorConfig::default()
    };
    let (handle, stream) = channel();
    // un productor atascado se reporta como DataTimeout
    let stream = stream.with_read_timeout(config.max_timeout());

    // Productor: simula el dispositivo enviando las muestras de la grabación
    let samples: Vec<_> = recording.samples().cloned().collect();
    let realtime = args.realtime;
    let producer = thread::spawn(move || {
        handle.set_connected(true);
        for sample in samples {
            if handle.send(sample).is_err() {
                break;
            }
            if realtime {
                thread::sleep(sample_period);
            }
        }
    });

    let source = WindowedStream::new(
        stream,
        EmgFeatureExtractor::new(&preprocessing),
        preprocessing.window_size,
        preprocessing.window_step,
    );
    let mut predictor = RealTimePredictor::connect(source, bundle.classifier, &config)?;
    println!("🔌 Stream conectado, votación sobre {} ventanas", predictor.vote_over());

    let mut decided = 0usize;
    loop {
        match predictor.vote() {
            Ok(Vote::Loading) => {
                if args.verbose {
                    println!("⏳ loading");
                }
            }
            Ok(vote) => {
                decided += 1;
                println!("🗳️  {}", vote);
            }
            Err(TrainerError::StreamClosed) => break,
            Err(e) => {
                eprintln!("❌ Error en la predicción: {}", e);
                return Err(e.into());
            }
        }
    }

    if producer.join().is_err() {
        eprintln!("⚠️  El hilo productor terminó con pánico");
    }
    println!("\n✅ Fin de la grabación: {} decisiones", decided);
    Ok(())
}

/// Periodo entre muestras; rechaza frecuencias que no dan una duración representable
fn sample_period(sample_rate: f32) -> Result<Duration> {
    ensure!(sample_rate > 0.0, "Frecuencia de muestreo inválida en el modelo: {}", sample_rate);
    Duration::try_from_secs_f32(1.0 / sample_rate)
        .with_context(|| format!("Frecuencia de muestreo inválida en el modelo: {}", sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_period_from_rate() {
        let period = sample_period(1000.0).unwrap();
        assert_eq!(period.as_micros(), 1000);
    }

    #[test]
    fn test_sample_period_rejects_degenerate_rates() {
        assert!(sample_period(0.0).is_err());
        assert!(sample_period(-5.0).is_err());
        assert!(sample_period(f32::NAN).is_err());
        // subnormal: 1/x es infinito
        assert!(sample_period(f32::MIN_POSITIVE / 4.0).is_err());
    }
}
