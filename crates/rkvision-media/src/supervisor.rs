// crates/rkvision-media/src/supervisor.rs
//
// Channel Supervisor: per-channel lifecycle. Init allocates the expensive,
// restart-surviving resources (surfaces, NN context, publisher); Running
// executes the decode loop; Backoff sleeps and retries on loop failure;
// Stopping tears everything down. An OS thread per channel, `Arc<AtomicBool>`
// for the stop flag.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use rkvision_core::constants::{BACKOFF_SLEEP_SECS, MAX_CONSECUTIVE_FAILURES};
use rkvision_core::ChannelConfig;

use crate::decode::{Decoder, FrameEvent};
use crate::dma::DmaPool;
use crate::nn::NnEngine;
use crate::postprocess::postprocess;
use crate::publisher::MjpegPublisher;
use crate::router::route;
use crate::snapshot::write_snapshots;

/// Whether a channel's `run()` call ended cleanly (external stop request) or
/// not — either init never completed (labels/model/publisher setup failed)
/// or the decode loop hit `MAX_CONSECUTIVE_FAILURES` and gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Clean,
    InitFailed,
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Init,
    Running,
    Backoff,
    SoftwareOnly,
    Terminated,
    Stopping,
}

pub struct ChannelSupervisor {
    config: ChannelConfig,
    should_stop: Arc<AtomicBool>,
}

impl ChannelSupervisor {
    pub fn new(config: ChannelConfig, process_stop: Arc<AtomicBool>) -> Self {
        Self {
            config,
            should_stop: process_stop,
        }
    }

    /// Runs the channel to completion on the calling thread. Intended to be
    /// spawned one-per-channel by the caller (the `rkvision` binary). The
    /// return value tells the caller whether the channel ever got running.
    pub fn run(self) -> SupervisorExit {
        let channel_id = self.config.id;
        info!("channel {channel_id}: init");

        let labels = match load_labels(&self.config.labels_path) {
            Ok(l) => l,
            Err(e) => {
                error!("channel {channel_id}: failed to load labels, terminating: {e}");
                return SupervisorExit::InitFailed;
            }
        };

        let nn = match NnEngine::load(&self.config.model_path) {
            Ok(nn) => nn,
            Err(e) => {
                error!("channel {channel_id}: model load failed, terminating: {e}");
                return SupervisorExit::InitFailed;
            }
        };
        let descriptor = nn.descriptor().clone();

        #[cfg(feature = "hwaccel")]
        let dma_pool = DmaPool::new(crate::hwlib::HwLibs::try_load());
        #[cfg(not(feature = "hwaccel"))]
        let dma_pool = DmaPool::new();

        let display_w = rkvision_core::constants::DEFAULT_DISPLAY_WIDTH;
        let display_h = rkvision_core::constants::DEFAULT_DISPLAY_HEIGHT;

        let (mut nn_surface, mut display_surface) = match dma_pool.allocate_channel_scratch(
            descriptor.model_width,
            descriptor.model_height,
            display_w,
            display_h,
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!("channel {channel_id}: surface allocation failed, retrying software-only: {e}");
                #[cfg(feature = "hwaccel")]
                let software_pool = DmaPool::new(None);
                #[cfg(not(feature = "hwaccel"))]
                let software_pool = DmaPool::new();
                match software_pool.allocate_channel_scratch(
                    descriptor.model_width,
                    descriptor.model_height,
                    display_w,
                    display_h,
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("channel {channel_id}: software-only allocation also failed, terminating: {e}");
                        return SupervisorExit::InitFailed;
                    }
                }
            }
        };

        let mut publisher = MjpegPublisher::init(self.config.port);
        if let Err(e) = publisher.start() {
            error!("channel {channel_id}: publisher bind failed, terminating: {e}");
            return SupervisorExit::InitFailed;
        }

        let mut state = SupervisorState::Running;
        let mut consecutive_failures = 0u32;
        let mut gave_up = false;

        loop {
            if self.should_stop.load(Ordering::Relaxed) {
                state = SupervisorState::Stopping;
            }

            match state {
                SupervisorState::Running => {
                    match self.decode_loop(
                        &nn,
                        &labels,
                        &mut nn_surface,
                        &mut display_surface,
                        display_w,
                        display_h,
                        &publisher,
                    ) {
                        Ok(()) => {
                            // Loop returned normally only on external stop.
                            state = SupervisorState::Stopping;
                        }
                        Err(e) => {
                            warn!("channel {channel_id}: decode loop failed: {e}");
                            consecutive_failures += 1;
                            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                                error!(
                                    "channel {channel_id}: {consecutive_failures} consecutive failures, terminating"
                                );
                                gave_up = true;
                                state = SupervisorState::Terminated;
                            } else {
                                state = SupervisorState::Backoff;
                            }
                        }
                    }
                }
                SupervisorState::Backoff => {
                    thread::sleep(Duration::from_secs(BACKOFF_SLEEP_SECS));
                    if self.should_stop.load(Ordering::Relaxed) {
                        state = SupervisorState::Stopping;
                    } else {
                        state = SupervisorState::Running;
                    }
                }
                SupervisorState::Terminated | SupervisorState::Stopping => break,
                SupervisorState::Init | SupervisorState::SoftwareOnly => {
                    state = SupervisorState::Running;
                }
            }
        }

        info!("channel {channel_id}: tearing down");
        publisher.stop();
        crate::dma::free_software(&nn_surface);
        crate::dma::free_software(&display_surface);
        if gave_up {
            SupervisorExit::GaveUp
        } else {
            SupervisorExit::Clean
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn decode_loop(
        &self,
        nn: &NnEngine,
        labels: &[String],
        nn_surface: &mut rkvision_core::Surface,
        display_surface: &mut rkvision_core::Surface,
        display_w: u32,
        display_h: u32,
        publisher: &MjpegPublisher,
    ) -> anyhow::Result<()> {
        let mut decoder = Decoder::open(&self.config.url, self.config.prefer_hw)
            .map_err(|e| anyhow::anyhow!("open failed: {e}"))?;

        loop {
            if self.should_stop.load(Ordering::Relaxed) {
                info!(
                    "channel {}: {} audio packets counted, not decoded",
                    self.config.id,
                    decoder.audio_packet_count()
                );
                decoder.close();
                return Ok(());
            }

            match decoder.pull() {
                FrameEvent::Again => continue,
                FrameEvent::End => return Err(anyhow::anyhow!("stream ended")),
                FrameEvent::Error(e) => return Err(anyhow::anyhow!("decoder receive error: {e}")),
                FrameEvent::Frame(frame) => {
                    let ts_ms = frame.pts();
                    #[cfg(feature = "hwaccel")]
                    let hw_libs = crate::hwlib::HwLibs::try_load();
                    #[cfg(feature = "hwaccel")]
                    let outcome = route(
                        hw_libs.as_ref(),
                        &frame,
                        self.config.prefer_hw,
                        nn_surface,
                        nn.descriptor().model_width,
                        nn.descriptor().model_height,
                        display_surface,
                        display_w,
                        display_h,
                    );
                    #[cfg(not(feature = "hwaccel"))]
                    let outcome = route(
                        &frame,
                        self.config.prefer_hw,
                        nn_surface,
                        nn.descriptor().model_width,
                        nn.descriptor().model_height,
                        display_surface,
                        display_w,
                        display_h,
                    );

                    let Some(_outcome) = outcome else {
                        continue; // both conversion paths failed; drop this frame
                    };

                    let nn_input = unsafe { nn_surface.as_slice() };
                    let outputs = match nn.infer(&nn_input[..nn.descriptor().input_byte_len()]) {
                        Ok(o) => o,
                        Err(e) => {
                            warn!("nn inference failed, dropping frame: {e}");
                            continue;
                        }
                    };

                    let detections = postprocess(
                        &outputs,
                        labels,
                        nn.descriptor().model_width,
                        nn.descriptor().model_height,
                        display_w,
                        display_h,
                        self.config.conf_threshold,
                        self.config.nms_threshold,
                    );
                    nn.release(outputs);

                    let display_bytes = unsafe { display_surface.as_slice() }.to_vec();

                    if !detections.is_empty() {
                        let encoder = crate::jpeg::JpegEncoder::new();
                        write_snapshots(
                            &self.config.snapshot_dir,
                            &encoder,
                            &display_bytes,
                            display_w,
                            display_h,
                            &detections,
                            ts_ms,
                        );
                    }

                    publisher.push(display_bytes, display_w, display_h, detections, ts_ms);
                }
            }
        }
    }
}

fn load_labels(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}
