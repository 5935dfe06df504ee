//! Run one generation end to end without a host and write the result to disk.
//!
//! Usage: generate [--test] [--out <file>] [prompt...]
//! The API key comes from FORGE_API_KEY or the config file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use forge_core::config;
use forge_core::processor::HostBlock;
use forge_core::{Bridge, GenerateParams, JobState, WakeFlag};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut test = false;
    let mut output_path = PathBuf::from("output.wav");
    let mut words = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--test" => test = true,
            "--out" => {
                if let Some(path) = args.next() {
                    output_path = PathBuf::from(path);
                }
            }
            _ => words.push(arg),
        }
    }
    let prompt = if words.is_empty() {
        "upbeat electronic dance music".to_string()
    } else {
        words.join(" ")
    };

    let mut cfg = config::load_config();
    if let Ok(key) = std::env::var("FORGE_API_KEY") {
        cfg.api_key = Some(key);
    }
    let host_rate = 48_000.0;
    let client = forge_core::suno::client_from_config(&cfg);
    let (bridge, mut processor) = Bridge::new(client, cfg, Arc::new(WakeFlag::new()));
    bridge.prepare(host_rate);

    println!("Prompt: {}", prompt);
    println!("Output: {}", output_path.display());
    println!();

    let started = if test {
        bridge.start_connectivity_test()
    } else {
        bridge.start_generate(GenerateParams {
            prompt,
            ..GenerateParams::default()
        })
    };
    if !started {
        eprintln!("could not start: {}", bridge.status_text());
        std::process::exit(1);
    }

    // Stand in for the host: one block every ~10 ms, collecting what plays.
    let block = 480;
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut last_status = String::new();
    loop {
        let state = bridge.state();
        if state == JobState::Failed {
            eprintln!("{}", bridge.last_error());
            std::process::exit(1);
        }
        let playing = state == JobState::Succeeded;

        let mut channels = vec![vec![0.0f32; block], vec![0.0f32; block]];
        let events = processor.process(
            &mut channels,
            HostBlock {
                is_playing: false,
                bpm: None,
                sample_rate: host_rate,
            },
        );
        if playing {
            left.extend_from_slice(&channels[0]);
            right.extend_from_slice(&channels[1]);
            if left.len() >= bridge.staged_frames() {
                break;
            }
            continue;
        }
        if events.result_ready {
            bridge.handle_result();
        }

        let status = bridge.status_text();
        if status != last_status {
            eprintln!("{}", status);
            last_status = status;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let frames = bridge.staged_frames();
    let interleaved: Vec<f32> = left[..frames]
        .iter()
        .zip(&right[..frames])
        .flat_map(|(&l, &r)| [l, r])
        .collect();
    println!(
        "Rendered {} frames ({:.1}s at {} Hz)",
        frames,
        frames as f64 / host_rate as f64,
        host_rate
    );
    forge_core::codec::write_wav(&output_path, &interleaved, host_rate as u32, 2)
        .expect("failed to write WAV");
    println!("Wrote {}", output_path.display());
}
