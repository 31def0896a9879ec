//! Filter graph compiler for the live encoder.
//!
//! Produces a `-filter_complex` description with three stages joined by `;`:
//!
//! 1. `[1:a]loudnorm=...[aud]` - loudness normalisation of the audio input
//! 2. `[0:v]scale,format,drawbox,drawtext[vtmp]` - track overlay
//! 3. `[vtmp]drawtext[vout]` - call-to-action overlay, or `[vtmp]copy[vout]`
//!
//! Output labels are fixed constants so they always match the `-map`
//! arguments built in [`crate::stream::invocation`].

use std::fmt::Write as _;

use super::template::sanitize_drawtext;

/// Label of the normalised audio output.
pub const AUDIO_OUT: &str = "aud";
/// Label of the video after the track overlay.
pub const VIDEO_TRACK: &str = "vtmp";
/// Label of the final video output.
pub const VIDEO_OUT: &str = "vout";

/// Input pad of the looped video source.
const VIDEO_IN: &str = "0:v";
/// Input pad of the audio source (single file or concat playlist).
const AUDIO_IN: &str = "1:a";

/// Loudness normalisation target (EBU R128 `loudnorm` parameters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTarget {
    /// Integrated loudness, LUFS.
    pub integrated: f64,
    /// True-peak ceiling, dBTP.
    pub true_peak: f64,
    /// Loudness range target, LU.
    pub range: f64,
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        Self {
            integrated: -14.0,
            true_peak: -1.5,
            range: 11.0,
        }
    }
}

/// Geometry and typography of the overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    pub width: u32,
    pub height: u32,
    /// Font for the track overlay
    pub track_font: String,
    /// Font for the call-to-action overlay
    pub cta_font: String,
    pub track_font_size: u32,
    pub cta_font_size: u32,
    /// Top of the semi-opaque band behind the track text
    pub band_y: u32,
    pub band_height: u32,
    /// `0xRRGGBBAA` colour of the band and the CTA box
    pub box_color: String,
    pub text_x: u32,
    pub text_y: u32,
    pub cta_y: u32,
    /// Fade-out length at the end of each text window; 0 disables fading.
    pub fade_seconds: f64,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            track_font: "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string(),
            cta_font: "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string(),
            track_font_size: 36,
            cta_font_size: 30,
            band_y: 600,
            band_height: 120,
            box_color: "0x00000088".to_string(),
            text_x: 20,
            text_y: 640,
            cta_y: 40,
            fade_seconds: 0.0,
        }
    }
}

/// What to draw, and for how long after launch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayText<'a> {
    pub track_text: &'a str,
    pub cta_text: &'a str,
    pub show_cta: bool,
    pub track_seconds: f64,
    pub cta_seconds: f64,
}

/// Compiles overlay text and timing into a filter graph description.
#[derive(Debug, Clone, Default)]
pub struct GraphCompiler {
    layout: OverlayLayout,
    loudness: LoudnessTarget,
}

impl GraphCompiler {
    #[must_use]
    pub fn new(layout: OverlayLayout, loudness: LoudnessTarget) -> Self {
        Self { layout, loudness }
    }

    #[must_use]
    pub fn layout(&self) -> &OverlayLayout {
        &self.layout
    }

    /// Build the filter graph. Pure and deterministic.
    #[must_use]
    pub fn compile(&self, overlay: &OverlayText<'_>) -> String {
        let stages = [
            self.audio_stage(),
            self.track_stage(overlay.track_text, overlay.track_seconds),
            if overlay.show_cta {
                self.cta_stage(overlay.cta_text, overlay.cta_seconds)
            } else {
                format!("[{VIDEO_TRACK}]copy[{VIDEO_OUT}]")
            },
        ];

        stages.join(";")
    }

    fn audio_stage(&self) -> String {
        let LoudnessTarget {
            integrated,
            true_peak,
            range,
        } = self.loudness;
        format!("[{AUDIO_IN}]loudnorm=I={integrated}:TP={true_peak}:LRA={range}[{AUDIO_OUT}]")
    }

    fn track_stage(&self, text: &str, seconds: f64) -> String {
        let l = &self.layout;
        let text = sanitize_drawtext(text);
        let enable = enable_window(seconds);

        let mut stage = format!(
            "[{VIDEO_IN}]scale={w}:{h},format=yuv420p,\
             drawbox=x=0:y={band_y}:w={w}:h={band_h}:color={color}:t=fill:enable='{enable}',\
             drawtext=fontfile={font}:expansion=none:text='{text}':x={x}:y={y}:fontsize={size}:fontcolor=white",
            w = l.width,
            h = l.height,
            band_y = l.band_y,
            band_h = l.band_height,
            color = l.box_color,
            font = l.track_font,
            x = l.text_x,
            y = l.text_y,
            size = l.track_font_size,
        );
        self.push_fade(&mut stage, seconds);
        let _ = write!(stage, ":enable='{enable}'[{VIDEO_TRACK}]");
        stage
    }

    fn cta_stage(&self, text: &str, seconds: f64) -> String {
        let l = &self.layout;
        let text = sanitize_drawtext(text);

        let mut stage = format!(
            "[{VIDEO_TRACK}]drawtext=fontfile={font}:expansion=none:text='{text}':x='(w-text_w)/2':y={y}:\
             fontsize={size}:fontcolor=white:box=1:boxcolor={color}",
            font = l.cta_font,
            y = l.cta_y,
            size = l.cta_font_size,
            color = l.box_color,
        );
        self.push_fade(&mut stage, seconds);
        let _ = write!(stage, ":enable='{}'[{VIDEO_OUT}]", enable_window(seconds));
        stage
    }

    /// Append an `alpha` expression fading the text out over the tail of its window.
    fn push_fade(&self, stage: &mut String, seconds: f64) {
        let fade = self.layout.fade_seconds;
        if fade <= 0.0 || seconds <= 0.0 {
            return;
        }
        let fade = fade.min(seconds);
        let _ = write!(
            stage,
            ":alpha='if(lt(t,{start}),1,max(0,({seconds}-t)/{fade}))'",
            start = seconds - fade,
        );
    }
}

/// `between(t,0,N)`: true while stream time is inside the overlay window.
fn enable_window(seconds: f64) -> String {
    format!("between(t,0,{seconds})")
}

/// Compile with the default layout and loudness target.
#[must_use]
pub fn compile(
    track_text: &str,
    cta_text: &str,
    show_cta: bool,
    track_seconds: f64,
    cta_seconds: f64,
) -> String {
    GraphCompiler::default().compile(&OverlayText {
        track_text,
        cta_text,
        show_cta,
        track_seconds,
        cta_seconds,
    })
}
