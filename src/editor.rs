use nih_plug::prelude::*;
use nih_plug_egui::{create_egui_editor, egui, widgets};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{AnalyzerRegistration, SpectrumAnalyzer, DEFAULT_FRAME_SIZE};
use crate::dsp::freq_to_log_position;
use crate::engine::EqShared;
use crate::params::EqParams;

/// ~30 Hz refresh
const REPAINT_INTERVAL: Duration = Duration::from_millis(33);

/// Grid lines on the frequency axis
const GRID_FREQUENCIES: [f32; 9] = [
    50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0,
];

/// dB window mapped onto the plot height
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl DisplayRange {
    pub const CURVE: Self = Self {
        min_db: -24.0,
        max_db: 24.0,
    };
    pub const SPECTRUM: Self = Self {
        min_db: -100.0,
        max_db: 6.0,
    };

    /// 0 at `min_db`, 1 at `max_db`, clamped
    pub fn normalize(&self, db: f32) -> f32 {
        ((db - self.min_db) / (self.max_db - self.min_db)).clamp(0.0, 1.0)
    }
}

/// Editor state (not persisted)
struct EditorState {
    shared: Arc<EqShared>,
    analyzer: Option<Arc<SpectrumAnalyzer>>,
    /// Last spectrum copied out of the analyzer, in dB
    spectrum: Vec<f32>,
}

/// The egui editor plus analyzer attachment for each open window.
///
/// The egui user state lives as long as the plugin, across window
/// open/close, so the registration cannot live there.
struct SpectrumEditor {
    inner: Box<dyn Editor>,
    shared: Arc<EqShared>,
    analyzer: Option<Arc<SpectrumAnalyzer>>,
}

/// Returned from `spawn`; the host drops it when the window closes
struct EditorSession {
    _window: Box<dyn Any + Send>,
    /// Declared after the window: detaches once the window is gone
    _registration: Option<AnalyzerRegistration>,
}

impl EditorSession {
    fn open(
        shared: &EqShared,
        analyzer: Option<&Arc<SpectrumAnalyzer>>,
        window: Box<dyn Any + Send>,
    ) -> Self {
        Self {
            _window: window,
            _registration: analyzer.map(|analyzer| shared.register_analyzer(analyzer.clone())),
        }
    }
}

impl Editor for SpectrumEditor {
    fn spawn(
        &self,
        parent: ParentWindowHandle,
        context: Arc<dyn GuiContext>,
    ) -> Box<dyn Any + Send> {
        let window = self.inner.spawn(parent, context);
        Box::new(EditorSession::open(&self.shared, self.analyzer.as_ref(), window))
    }

    fn size(&self) -> (u32, u32) {
        self.inner.size()
    }

    fn set_scale_factor(&self, factor: f32) -> bool {
        self.inner.set_scale_factor(factor)
    }

    fn param_value_changed(&self, id: &str, normalized_value: f32) {
        self.inner.param_value_changed(id, normalized_value);
    }

    fn param_modulation_changed(&self, id: &str, modulation_offset: f32) {
        self.inner.param_modulation_changed(id, modulation_offset);
    }

    fn param_values_changed(&self) {
        self.inner.param_values_changed();
    }
}

/// Create the plugin editor GUI
pub fn create(params: Arc<EqParams>, shared: Arc<EqShared>) -> Option<Box<dyn Editor>> {
    let analyzer = match SpectrumAnalyzer::new(DEFAULT_FRAME_SIZE) {
        Ok(analyzer) => Some(Arc::new(analyzer)),
        Err(err) => {
            nih_error!("Spectrum display disabled: {err}");
            None
        }
    };
    let spectrum = vec![DisplayRange::SPECTRUM.min_db; DEFAULT_FRAME_SIZE / 2];

    let inner = create_egui_editor(
        params.editor_state.clone(),
        EditorState {
            shared: shared.clone(),
            analyzer: analyzer.clone(),
            spectrum,
        },
        |_, _| {},
        move |egui_ctx, setter, state| {
            egui_ctx.request_repaint_after(REPAINT_INTERVAL);

            if let Some(analyzer) = &state.analyzer {
                if analyzer.take_frame_ready() {
                    analyzer.copy_spectrum_db(&mut state.spectrum);
                }
            }

            egui::CentralPanel::default().show(egui_ctx, |ui| {
                let size = egui::vec2(ui.available_width(), ui.available_height() * 0.6);
                let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
                let rect = response.rect;

                painter.rect_filled(rect, 0.0, egui::Color32::from_gray(16));
                draw_grid(&painter, rect);

                if let Some(analyzer) = &state.analyzer {
                    let sample_rate = state.shared.cache().sample_rate() as f32;
                    draw_spectrum(&painter, rect, analyzer, &state.spectrum, sample_rate);
                }

                let num_points = rect.width().max(2.0) as usize;
                state
                    .shared
                    .curve()
                    .with_points(num_points, params.as_ref(), |points| {
                        draw_curve(&painter, rect, points);
                    });

                ui.separator();

                egui::ScrollArea::horizontal().show(ui, |ui| {
                    ui.horizontal(|ui| {
                        for (index, band) in params.bands.iter().enumerate() {
                            ui.group(|ui| {
                                ui.vertical(|ui| {
                                    ui.label(format!("Band {}", index + 1));
                                    ui.add(widgets::ParamSlider::for_param(&band.filter_type, setter));
                                    ui.add(widgets::ParamSlider::for_param(&band.frequency, setter));
                                    if band.selected_type().has_gain() {
                                        ui.add(widgets::ParamSlider::for_param(&band.gain, setter));
                                    }
                                    ui.add(widgets::ParamSlider::for_param(&band.q, setter));
                                });
                            });
                        }
                    });
                });
            });
        },
    )?;

    Some(Box::new(SpectrumEditor {
        inner,
        shared,
        analyzer,
    }))
}

fn plot_x(rect: egui::Rect, freq: f32) -> f32 {
    rect.left() + freq_to_log_position(freq) * rect.width()
}

fn plot_y(rect: egui::Rect, range: DisplayRange, db: f32) -> f32 {
    rect.bottom() - range.normalize(db) * rect.height()
}

fn draw_grid(painter: &egui::Painter, rect: egui::Rect) {
    let stroke = egui::Stroke::new(1.0, egui::Color32::from_gray(40));

    for freq in GRID_FREQUENCIES {
        let x = plot_x(rect, freq);
        painter.line_segment([egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())], stroke);
    }

    for db in [-12.0, 0.0, 12.0] {
        let y = plot_y(rect, DisplayRange::CURVE, db);
        painter.line_segment([egui::pos2(rect.left(), y), egui::pos2(rect.right(), y)], stroke);
    }
}

fn draw_spectrum(
    painter: &egui::Painter,
    rect: egui::Rect,
    analyzer: &SpectrumAnalyzer,
    spectrum: &[f32],
    sample_rate: f32,
) {
    let points: Vec<egui::Pos2> = analyzer
        .visible_bins(sample_rate)
        .filter_map(|bin| {
            let db = *spectrum.get(bin)?;
            let freq = analyzer.bin_frequency(bin, sample_rate);
            Some(egui::pos2(
                plot_x(rect, freq),
                plot_y(rect, DisplayRange::SPECTRUM, db),
            ))
        })
        .collect();

    if points.len() > 1 {
        painter.add(egui::Shape::line(
            points,
            egui::Stroke::new(1.0, egui::Color32::from_rgb(70, 110, 160)),
        ));
    }
}

fn draw_curve(painter: &egui::Painter, rect: egui::Rect, points: &[f32]) {
    if points.len() < 2 {
        return;
    }

    let last = (points.len() - 1) as f32;
    let line: Vec<egui::Pos2> = points
        .iter()
        .enumerate()
        .map(|(i, &db)| {
            egui::pos2(
                rect.left() + i as f32 / last * rect.width(),
                plot_y(rect, DisplayRange::CURVE, db),
            )
        })
        .collect();

    painter.add(egui::Shape::line(
        line,
        egui::Stroke::new(2.0, egui::Color32::from_rgb(240, 180, 60)),
    ));
}
