//! Mono downmix, resampling, and fixed-size framing

use super::types::AudioFrame;
use rubato::{Resampler, SincFixedIn};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Frame size in samples (~171ms of audio at 24kHz)
pub(crate) const FRAME_SIZE: usize = 4096;

/// Process incoming audio samples: convert to mono, optionally resample,
/// buffer, and send fixed-size frames
pub(crate) fn process_samples(
    data: &[f32],
    channels: usize,
    input_buffer: &Arc<Mutex<Vec<f32>>>,
    input_chunk_size: usize,
    output_buffer: &Arc<Mutex<Vec<f32>>>,
    sender: &mpsc::Sender<AudioFrame>,
    resampler: &Option<Arc<Mutex<SincFixedIn<f32>>>>,
) {
    // Convert to mono by averaging channels
    let mono_samples: Vec<f32> = if channels > 1 {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        data.to_vec()
    };

    if let Some(resampler_arc) = resampler {
        process_with_resampler(
            &mono_samples,
            input_buffer,
            input_chunk_size,
            output_buffer,
            sender,
            resampler_arc,
        );
    } else {
        // Device already runs at the target rate - direct buffering
        process_direct(&mono_samples, output_buffer, sender);
    }
}

/// Process samples with resampling
fn process_with_resampler(
    mono_samples: &[f32],
    input_buffer: &Arc<Mutex<Vec<f32>>>,
    input_chunk_size: usize,
    output_buffer: &Arc<Mutex<Vec<f32>>>,
    sender: &mpsc::Sender<AudioFrame>,
    resampler_arc: &Arc<Mutex<SincFixedIn<f32>>>,
) {
    if let Ok(mut input_buf) = input_buffer.lock() {
        input_buf.extend(mono_samples);

        // Process complete chunks through the resampler
        while input_buf.len() >= input_chunk_size {
            let input_chunk: Vec<f32> = input_buf.drain(..input_chunk_size).collect();

            if let Ok(mut resampler) = resampler_arc.lock() {
                match resampler.process(&[input_chunk], None) {
                    Ok(resampled) => {
                        if let Ok(mut output_buf) = output_buffer.lock() {
                            output_buf.extend(&resampled[0]);
                        }
                    }
                    Err(e) => {
                        error!("Resampling error: {}", e);
                    }
                }
            }
        }
    }

    send_frames(output_buffer, sender);
}

/// Process samples directly without resampling
fn process_direct(
    mono_samples: &[f32],
    output_buffer: &Arc<Mutex<Vec<f32>>>,
    sender: &mpsc::Sender<AudioFrame>,
) {
    if let Ok(mut output_buf) = output_buffer.lock() {
        output_buf.extend(mono_samples);
    }
    send_frames(output_buffer, sender);
}

/// Send complete frames from the output buffer
fn send_frames(output_buffer: &Arc<Mutex<Vec<f32>>>, sender: &mpsc::Sender<AudioFrame>) {
    if let Ok(mut output_buf) = output_buffer.lock() {
        while output_buf.len() >= FRAME_SIZE {
            let samples: Vec<f32> = output_buf.drain(..FRAME_SIZE).collect();
            // Use try_send to avoid blocking the audio callback
            match sender.try_send(AudioFrame { samples }) {
                Ok(_) => {}
                Err(e) => {
                    warn!("Audio buffer overflow - frame dropped: {}", e);
                    return;
                }
            }
        }
    }
}
