use std::time::Instant;

use phrase_tts::{EngineConfig, SpeechEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = EngineConfig::default().apply_env();
    let engine = SpeechEngine::start(config).await;
    if !engine.is_available() {
        println!("Speech engine unavailable: {:?}", engine.status());
        return Ok(());
    }

    let warm_start = Instant::now();
    let warmed = engine.warmup().await?;
    println!("Warmup {} in {:.2?}", if warmed { "done" } else { "failed" }, warm_start.elapsed());

    let phrases = [
        "Heeey.. let's plaay!",
        "Can you find the letter B?",
        "Gooood job!",
        "Heeey.. let's plaay!",
    ];

    for phrase in phrases {
        let synth_start = Instant::now();
        let result = engine.generate(phrase, 1.0).await?;
        let synth_dur = synth_start.elapsed();
        println!(
            "{phrase:?}: {:.2}s audio at {}Hz in {:.2?}",
            result.duration, result.sample_rate, synth_dur
        );
    }

    println!("{} phrases cached", engine.cached_entries());
    engine.destroy();
    Ok(())
}
