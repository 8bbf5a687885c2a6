// crates/rkvision/src/main.rs
//
// CLI entry point. Single-channel mode takes one stream URL; with no
// arguments the binary starts the fixed 8-channel table on ports
// 8090..8097. Ctrl-C triggers a graceful stop: the process-wide stop token
// is flipped, every channel supervisor notices on its next loop iteration,
// and the process exits once all channel threads have joined.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::info;
use rkvision_core::constants::{FIXED_CHANNEL_BASE_PORT, FIXED_CHANNEL_COUNT};
use rkvision_core::ChannelConfig;
use rkvision_media::supervisor::{ChannelSupervisor, SupervisorExit};

#[derive(Parser, Debug)]
#[command(name = "rkvision", about = "Multi-channel decode -> detect -> MJPEG daemon")]
struct Args {
    /// Single stream URL (RTSP or file path). Omit to run the fixed
    /// 8-channel table on ports 8090..8097 instead.
    stream_url: Option<String>,

    #[arg(long, default_value_t = 8090)]
    port: u16,

    #[arg(long, default_value = "model.rknn")]
    model: PathBuf,

    #[arg(long, default_value = "labels.txt")]
    labels: PathBuf,

    #[arg(long, default_value = "./detections")]
    snapshot_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    no_hw: bool,

    #[arg(long, default_value_t = 0.25)]
    conf_threshold: f32,

    #[arg(long, default_value_t = 0.45)]
    nms_threshold: f32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    rkvision_media::probe_hardware_decoders();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            info!("received interrupt, stopping all channels");
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let configs = match &args.stream_url {
        Some(url) => vec![ChannelConfig {
            id: 0,
            url: url.clone(),
            port: args.port,
            prefer_hw: !args.no_hw,
            model_path: args.model.clone(),
            labels_path: args.labels.clone(),
            snapshot_dir: args.snapshot_dir.clone(),
            conf_threshold: args.conf_threshold,
            nms_threshold: args.nms_threshold,
        }],
        None => fixed_channels(&args),
    };

    info!("starting {} channel(s)", configs.len());
    let single_channel = args.stream_url.is_some();

    let handles: Vec<_> = configs
        .into_iter()
        .map(|config| {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let channel_id = config.id;
                let supervisor = ChannelSupervisor::new(config, stop);
                let exit = supervisor.run();
                info!("channel {channel_id} thread exited ({exit:?})");
                exit
            })
        })
        .collect();

    let exits: Vec<SupervisorExit> = handles.into_iter().filter_map(|h| h.join().ok()).collect();

    info!("all channels stopped, exiting");

    if single_channel && exits.first() == Some(&SupervisorExit::InitFailed) {
        anyhow::bail!("channel failed to initialize");
    }

    Ok(())
}

/// Fixed 8-channel table: paths `ch0..ch7`, ports 8090..8097, sharing the
/// CLI's model/labels/snapshot-dir/threshold flags as defaults for every
/// channel.
fn fixed_channels(args: &Args) -> Vec<ChannelConfig> {
    (0..FIXED_CHANNEL_COUNT)
        .map(|i| ChannelConfig {
            id: i,
            url: format!("ch{i}"),
            port: FIXED_CHANNEL_BASE_PORT + i as u16,
            prefer_hw: !args.no_hw,
            model_path: args.model.clone(),
            labels_path: args.labels.clone(),
            snapshot_dir: args.snapshot_dir.join(format!("ch{i}")),
            conf_threshold: args.conf_threshold,
            nms_threshold: args.nms_threshold,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_channels_cover_the_expected_port_range() {
        let args = Args {
            stream_url: None,
            port: 8090,
            model: PathBuf::from("model.rknn"),
            labels: PathBuf::from("labels.txt"),
            snapshot_dir: PathBuf::from("./detections"),
            no_hw: false,
            conf_threshold: 0.25,
            nms_threshold: 0.45,
        };
        let channels = fixed_channels(&args);
        assert_eq!(channels.len(), 8);
        assert_eq!(channels[0].port, 8090);
        assert_eq!(channels[7].port, 8097);
    }
}
