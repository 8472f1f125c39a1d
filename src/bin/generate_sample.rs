use std::path::Path;

use serde_json::{json, Map, Value};

/// Folders of the first two Cohort B visits.
const FOLDERS: [&str; 2] = [
    "Baseline Cohort B (4.11.2024)",
    "Day 8 Phase II Cohort B (4.30.2024)",
];

/// One subject per group. 13076 gets no LA file at Day 8 so the skip path
/// shows up in a run.
const SUBJECTS: [u32; 3] = [13080, 13075, 13076];

const DA_INTENSITIES: [f64; 10] = [0.001, 0.003, 0.01, 0.03, 0.1, 0.3, 1.0, 3.0, 10.0, 150.0];
/// Flicker frequency per LA step, 0 for single flashes.
const LA_STEPS: [(f64, f64); 7] = [
    (0.03, 0.0),
    (0.3, 0.0),
    (3.0, 0.0),
    (3.0, 10.0),
    (3.0, 20.0),
    (3.0, 30.0),
    (3.0, 40.0),
];

const START_MS: f64 = -20.0;
const DELTA_MS: f64 = 0.5;
const N_SAMPLES: usize = 500;

/// Baseline noise of every channel, nV.
const NOISE_NV: f64 = 1_500.0;

/// Gaussian bump centred on `centre` ms.
fn bump(t: f64, centre: f64, width: f64, height: f64) -> f64 {
    let z = (t - centre) / width;
    height * (-0.5 * z * z).exp()
}

/// SplitMix64 stream, one per export file so each file is reproducible on
/// its own.
struct Noise {
    state: u64,
}

impl Noise {
    fn for_file(subject: u32, visit: usize, protocol: &str) -> Self {
        let tag = protocol.bytes().fold(0u64, |acc, b| (acc << 8) | u64::from(b));
        Noise {
            state: (u64::from(subject) << 32) ^ ((visit as u64) << 16) ^ tag,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [-1, 1).
    fn signed_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 52) as f64 - 1.0
    }

    /// Zero-mean normal sample with standard deviation [`NOISE_NV`]
    /// (Marsaglia polar method).
    fn sample(&mut self) -> f64 {
        loop {
            let (u, v) = (self.signed_unit(), self.signed_unit());
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                return NOISE_NV * u * (-2.0 * s.ln() / s).sqrt();
            }
        }
    }
}

/// Flash response in nV: a-wave trough then b-wave peak, both growing with
/// log intensity. Returns the waveform and the (a, b) marker positions.
fn flash_response(
    intensity: f64,
    gain: f64,
    noise: &mut Noise,
) -> (Vec<f64>, (f64, f64), (f64, f64)) {
    let drive = (intensity.log10() + 3.5).max(0.2);
    let a_amp = -25_000.0 * drive * gain;
    let b_amp = 60_000.0 * drive * gain;
    let (a_t, b_t) = (15.0, 45.0 - 2.0 * drive);

    let values = (0..N_SAMPLES)
        .map(|i| {
            let t = START_MS + DELTA_MS * i as f64;
            if t < 0.0 {
                return noise.sample();
            }
            bump(t, a_t, 4.0, a_amp) + bump(t, b_t, 14.0, b_amp) + noise.sample()
        })
        .collect();
    (values, (a_t, a_amp / 1000.0), (b_t, b_amp / 1000.0))
}

fn flicker_response(freq: f64, gain: f64, noise: &mut Noise) -> (Vec<f64>, (f64, f64)) {
    let amp = 40_000.0 * gain * (30.0 / freq).min(1.5);
    let period = 1000.0 / freq;
    let values = (0..N_SAMPLES)
        .map(|i| {
            let t = START_MS + DELTA_MS * i as f64;
            amp * (2.0 * std::f64::consts::PI * t / period).sin() + noise.sample()
        })
        .collect();
    (values, (period / 4.0, amp / 1000.0))
}

fn series(values: Vec<f64>) -> Value {
    json!({ "results": { "1": { "data": {
        "start": START_MS,
        "delta": DELTA_MS,
        "values": values,
    }}}})
}

fn marker(chan: u32, name: &str, (time, amp): (f64, f64)) -> Value {
    let eye = if chan == 1 { "OD" } else { "OS" };
    json!({
        "chan": chan,
        "eye": eye,
        "name": name,
        "amp": amp,
        "time": time,
    })
}

/// One export file as the parser would return it: `(header, recording)`.
fn recording(steps: &[(f64, f64)], gain: f64, noise: &mut Noise) -> Value {
    let mut markers = Map::new();
    let mut data = Map::new();

    for (idx, &(intensity, freq)) in steps.iter().enumerate() {
        let step = (idx + 1).to_string();
        let mut step_markers = Vec::new();
        let mut channels = Map::new();

        for chan in [1u32, 2] {
            // Left eye answers a little weaker.
            let eye_gain = if chan == 1 { gain } else { gain * 0.85 };
            let values = if freq > 0.0 {
                let (values, peak) = flicker_response(freq, eye_gain, noise);
                step_markers.push(marker(chan, "P1", peak));
                values
            } else {
                let (values, a, b) = flash_response(intensity, eye_gain, noise);
                step_markers.push(marker(chan, "a", a));
                step_markers.push(marker(chan, "B", b));
                values
            };
            channels.insert(chan.to_string(), series(values));
        }

        markers.insert(step.clone(), Value::Array(step_markers));
        data.insert(step, json!({ "channels": channels }));
    }

    json!([
        { "format": "synthetic", "version": 1 },
        { "markers": markers, "data": data },
    ])
}

fn write(path: &Path, value: &Value) {
    let text = serde_json::to_string(value).expect("Failed to serialize recording");
    std::fs::write(path, text).expect("Failed to write export file");
}

fn main() {
    let out_root = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_data".to_string());
    let out_root = Path::new(&out_root);

    let da_steps: Vec<(f64, f64)> = DA_INTENSITIES.iter().map(|&i| (i, 0.0)).collect();
    let mut files = 0;

    for (visit, folder) in FOLDERS.iter().enumerate() {
        let dir = out_root.join(folder);
        std::fs::create_dir_all(&dir).expect("Failed to create output folder");

        for (k, &subject) in SUBJECTS.iter().enumerate() {
            let gain = 1.0 - 0.1 * k as f64 - 0.05 * visit as f64;

            write(
                &dir.join(format!("Rabbit {subject} DA.json")),
                &recording(&da_steps, gain, &mut Noise::for_file(subject, visit, "DA")),
            );
            files += 1;

            if subject == 13076 && visit == 1 {
                continue;
            }
            write(
                &dir.join(format!("Rabbit {subject} LA.json")),
                &recording(&LA_STEPS, gain, &mut Noise::for_file(subject, visit, "LA")),
            );
            files += 1;
        }
    }

    println!("Wrote {files} export files under {}", out_root.display());
}
