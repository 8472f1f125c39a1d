use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use plotters::prelude::*;

use crate::color::eye_color;
use crate::config::PlotConfig;
use crate::data::model::Eye;
use crate::data::trace::ExtractedTrace;

/// Where extracted traces go.
pub trait TraceSink {
    /// Emit one eye of a trace for a visit.
    fn emit(&mut self, subject: u32, timepoint: &str, trace: &ExtractedTrace, eye: Eye) -> Result<()>;
}

/// `"13080_Day 8_DA 0.01_OD.png"`
pub fn image_file_name(subject: u32, timepoint: &str, stimulus_tag: &str, eye: Eye) -> String {
    format!("{subject}_{timepoint}_{stimulus_tag}_{eye}.png")
}

pub fn plot_title(subject: u32, timepoint: &str, stimulus_tag: &str, eye: Eye) -> String {
    format!("Subject:{subject} {timepoint} Stim:{stimulus_tag} Eye:{eye}")
}

/// Time span covered by the x axis. A single sample still gets a 1 ms window.
fn time_span(time: &[f64]) -> (f64, f64) {
    match (time.first(), time.last()) {
        (Some(&first), Some(&last)) if last > first => (first, last),
        (Some(&first), _) => (first, first + 1.0),
        _ => (0.0, 1.0),
    }
}

// ---------------------------------------------------------------------------
// PngTraceRenderer
// ---------------------------------------------------------------------------

/// Renders each eye of each trace to its own PNG line plot.
pub struct PngTraceRenderer {
    out_dir: PathBuf,
    size: (u32, u32),
    written: usize,
}

impl PngTraceRenderer {
    /// Creates `out_dir` if it does not exist.
    pub fn new(out_dir: &Path, plot: PlotConfig) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;
        Ok(PngTraceRenderer {
            out_dir: out_dir.to_path_buf(),
            size: (plot.width, plot.height),
            written: 0,
        })
    }

    pub fn images_written(&self) -> usize {
        self.written
    }

    fn render(&self, path: &Path, title: &str, trace: &ExtractedTrace, eye: Eye) -> Result<()> {
        let (y_min, y_max) = trace.display_range();
        let (x_min, x_max) = time_span(&trace.time);
        let color = eye_color(eye);

        let root = BitMapBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

        chart
            .configure_mesh()
            .x_desc("Time (ms)")
            .y_desc("Amplitude (uV)")
            .draw()?;

        let points = trace
            .time
            .iter()
            .copied()
            .zip(trace.series(eye).amplitudes.iter().copied());
        chart.draw_series(LineSeries::new(points, &color))?;

        root.present()?;
        Ok(())
    }
}

impl TraceSink for PngTraceRenderer {
    fn emit(&mut self, subject: u32, timepoint: &str, trace: &ExtractedTrace, eye: Eye) -> Result<()> {
        let tag = &trace.stimulus.tag;
        let path = self
            .out_dir
            .join(image_file_name(subject, timepoint, tag, eye));
        let title = plot_title(subject, timepoint, tag, eye);

        self.render(&path, &title, trace, eye)
            .with_context(|| format!("rendering {}", path.display()))?;
        self.written += 1;
        debug!("Wrote {} ({})", path.display(), trace.step_label);
        Ok(())
    }
}
