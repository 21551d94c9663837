use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sg_audio::file::FileCapture;
use sg_audio::pipeline::Pipeline;
use sg_core::config::{EmitterKind, SonicConfig};

pub mod cli;
pub mod setup;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    if cli.list_devices {
        return list_devices();
    }

    // 3. Charger la config
    let mut config = resolve_config(&cli)?;

    // 4. Décoder le fichier d'entrée : sa fréquence d'échantillonnage fait foi
    let file = cli
        .input
        .as_ref()
        .map(FileCapture::open)
        .transpose()
        .context("Cannot read --input file")?;

    // 4b. Appliquer les overrides CLI
    apply_overrides(&cli, &mut config, file.as_ref().map(FileCapture::sample_rate));

    // 5. Valider avant de toucher au matériel audio
    config.validate().context("Invalid configuration")?;

    // 6. Emitters, capture
    let emitter = setup::build_emitter(&config)?;
    let capture = setup::build_capture(file, cli.fast);

    // 7. Ctrl-C → arrêt propre
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("Cannot install Ctrl-C handler")?;

    // 8. Lancer le pipeline
    let pipeline = Pipeline::start(&config, capture, emitter).context("Cannot start pipeline")?;

    // 9. Attendre Ctrl-C, une faute ou la fin du fichier
    loop {
        match stop_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) => {
                log::info!("Interrupted, stopping");
                break;
            }
            Err(flume::RecvTimeoutError::Timeout) if pipeline.is_finished() => break,
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    // 10. Arrêt : capture d'abord, puis vidage de la file
    let report = pipeline.stop();
    if !report.is_clean() {
        anyhow::bail!("Pipeline stopped on a fault: {report}");
    }
    log::info!("Done: {report}");
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = sg_audio::capture::list_input_devices().context("Cannot enumerate input devices")?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    for (index, name) in devices {
        println!("{index:>3}  {name}");
    }
    Ok(())
}

/// Load --config if it exists, defaults otherwise.
fn resolve_config(cli: &cli::Cli) -> Result<SonicConfig> {
    if cli.config.exists() {
        sg_core::config::load_config(&cli.config)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            cli.config.display()
        );
        Ok(SonicConfig::default())
    }
}

fn apply_overrides(cli: &cli::Cli, config: &mut SonicConfig, file_rate: Option<u32>) {
    if let Some(ref device) = cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(sr) = cli.sr {
        config.audio.sample_rate = sr;
    }
    if let Some(rate) = file_rate {
        if rate != config.audio.sample_rate {
            log::info!(
                "Using the input file's sample rate ({rate} Hz) instead of {} Hz",
                config.audio.sample_rate
            );
        }
        config.audio.sample_rate = rate;
    }
    if let Some(block) = cli.block {
        config.audio.block_size = block;
    }
    if let Some(bands) = cli.bands {
        config.features.bands = bands;
    }
    if cli.no_onset {
        config.onset.enabled = false;
    }
    if cli.stdout {
        config.emitter.kind = EmitterKind::Stdout;
    }
    if let Some(ref host) = cli.host {
        config.osc.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.osc.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> cli::Cli {
        cli::Cli::parse_from(std::iter::once("sonicgeo").chain(args.iter().copied()))
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "--sr", "48000", "--block", "2048", "--bands", "24", "--device", "usb", "--no-onset",
            "--stdout", "--host", "10.0.0.2", "--port", "9000",
        ]);
        let mut config = SonicConfig::default();
        apply_overrides(&cli, &mut config, None);
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.block_size, 2048);
        assert_eq!(config.features.bands, 24);
        assert_eq!(
            config.audio.device,
            Some(sg_core::config::DeviceSelector::Name("usb".into()))
        );
        assert!(!config.onset.enabled);
        assert_eq!(config.emitter.kind, EmitterKind::Stdout);
        assert_eq!(config.osc.host, "10.0.0.2");
        assert_eq!(config.osc.port, 9000);
    }

    #[test]
    fn input_file_rate_wins() {
        let cli = parse(&["--sr", "44100"]);
        let mut config = SonicConfig::default();
        apply_overrides(&cli, &mut config, Some(22050));
        assert_eq!(config.audio.sample_rate, 22050);
    }

    #[test]
    fn numeric_device_is_an_index() {
        let cli = parse(&["--device", "3"]);
        assert_eq!(cli.device, Some(sg_core::config::DeviceSelector::Index(3)));
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let cli = parse(&["--config", "/nonexistent/sonicgeo.toml"]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.audio.block_size, 1024);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        cli::Cli::command().debug_assert();
    }
}
