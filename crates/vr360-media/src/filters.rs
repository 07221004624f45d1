//! FFmpeg `v360` filter graph construction.
//!
//! Turns the declarative [`FilterSpec`] and grid transforms into
//! `-filter_complex` graphs. Every graph reads `[0:v]` (or `[N:v]` for grids)
//! and ends in [`VIDEO_OUT`].

use vr360_models::{
    CubemapLayout, Eye, FilterSpec, GridShape, ProjectionType, Resolution, StereoMode,
    StereoTransform, ViewportConfig, ViewportMotion,
};

use crate::error::{MediaError, MediaResult};

/// Label of the filtered video stream.
pub const VIDEO_OUT: &str = "[vout]";

/// Pan commands per second of motion.
const MOTION_STEPS_PER_SECOND: f64 = 10.0;

/// Upper bound on generated pan commands.
const MAX_MOTION_STEPS: usize = 600;

/// Field of view of fisheye outputs (degrees).
const FISHEYE_OUTPUT_FOV: f64 = 190.0;

/// `v360` format name of a projection.
///
/// `output` selects the output side; pannini only exists as an output.
pub fn v360_format(projection: ProjectionType, output: bool) -> MediaResult<String> {
    let code = match projection {
        ProjectionType::Equirectangular => "e",
        ProjectionType::HalfEquirectangular => "hequirect",
        ProjectionType::Cubemap { layout } => return Ok(cubemap_format(layout).to_string()),
        ProjectionType::Eac => "eac",
        ProjectionType::Fisheye => "fisheye",
        ProjectionType::DualFisheye => "dfisheye",
        ProjectionType::Cylindrical => "cylindrical",
        ProjectionType::Stereographic => "sg",
        ProjectionType::Pannini if output => "pannini",
        ProjectionType::Pannini => {
            return Err(MediaError::unsupported_conversion(
                "pannini can only be produced, not read",
            ))
        }
        ProjectionType::Mercator => "mercator",
        ProjectionType::Flat => "flat",
        ProjectionType::Unknown => return Err(MediaError::UnsupportedProjection(projection)),
    };
    Ok(code.to_string())
}

fn cubemap_format(layout: CubemapLayout) -> &'static str {
    match layout {
        CubemapLayout::ThreeByTwo => "c3x2",
        CubemapLayout::SixByOne => "c6x1",
        CubemapLayout::OneBySix => "c1x6",
        CubemapLayout::TwoByThree => "c2x3",
    }
}

fn stereo_format(mode: StereoMode) -> Option<&'static str> {
    match mode {
        StereoMode::TopBottom => Some("tb"),
        StereoMode::LeftRight => Some("sbs"),
        StereoMode::Mono
        | StereoMode::FrameSequential
        | StereoMode::Anaglyph
        | StereoMode::Unknown => None,
    }
}

/// Crop expression keeping one eye of a packed frame.
fn eye_crop(packing: StereoMode, eye: Eye) -> MediaResult<&'static str> {
    match (packing, eye) {
        (StereoMode::TopBottom, Eye::Left) => Ok("crop=iw:ih/2:0:0"),
        (StereoMode::TopBottom, Eye::Right) => Ok("crop=iw:ih/2:0:ih/2"),
        (StereoMode::LeftRight, Eye::Left) => Ok("crop=iw/2:ih:0:0"),
        (StereoMode::LeftRight, Eye::Right) => Ok("crop=iw/2:ih:iw/2:0"),
        (other, _) => Err(MediaError::unsupported_conversion(format!(
            "cannot extract an eye from {} video",
            other
        ))),
    }
}

/// Scale restoring the full frame after an eye crop.
fn eye_restore(packing: StereoMode) -> &'static str {
    match packing {
        StereoMode::LeftRight => "scale=iw*2:ih",
        _ => "scale=iw:ih*2",
    }
}

/// Short decimal rendering for filter arguments.
fn num(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Vertical field of view matching a viewport's aspect ratio.
pub fn vertical_fov(viewport: &ViewportConfig) -> f64 {
    let half = (viewport.fov.to_radians() / 2.0).tan();
    let ratio = viewport.output_height as f64 / viewport.output_width.max(1) as f64;
    2.0 * (half * ratio).atan().to_degrees()
}

/// Accumulates a filter graph: complete statements plus the open chain.
struct GraphBuilder {
    statements: Vec<String>,
    head: String,
    chain: Vec<String>,
}

impl GraphBuilder {
    fn new(input: &str) -> Self {
        Self {
            statements: Vec::new(),
            head: input.to_string(),
            chain: Vec::new(),
        }
    }

    fn push(&mut self, filter: impl Into<String>) {
        self.chain.push(filter.into());
    }

    fn statement(&mut self, statement: String) {
        self.statements.push(statement);
    }

    fn reset_head(&mut self, head: impl Into<String>) {
        self.head = head.into();
    }

    fn finish(mut self) -> String {
        if self.chain.is_empty() {
            self.chain.push("null".to_string());
        }
        let tail = format!("{}{}{}", self.head, self.chain.join(","), VIDEO_OUT);
        self.statements.push(tail);
        self.statements.join(";")
    }
}

/// Build the `-filter_complex` graph for one projection transform.
pub fn build_projection_filter(spec: &FilterSpec) -> MediaResult<String> {
    let mut graph = GraphBuilder::new("[0:v]");

    let packing = match spec.stereo {
        StereoTransform::None => spec.source_stereo,
        StereoTransform::ExtractEye { packing, eye } => {
            graph.push(eye_crop(packing, eye)?);
            graph.push(eye_restore(packing));
            StereoMode::Mono
        }
        StereoTransform::Repack { from, to } if from == to => from,
        StereoTransform::Repack { from, to } => {
            let stack = match (from, to) {
                (StereoMode::TopBottom, StereoMode::LeftRight) => "hstack=inputs=2",
                (StereoMode::LeftRight, StereoMode::TopBottom) => "vstack=inputs=2",
                _ => {
                    return Err(MediaError::unsupported_conversion(format!(
                        "cannot repack {} video as {}",
                        from, to
                    )))
                }
            };
            graph.statement("[0:v]split=2[eye0][eye1]".to_string());
            graph.statement(format!("[eye0]{}[left]", eye_crop(from, Eye::Left)?));
            graph.statement(format!("[eye1]{}[right]", eye_crop(from, Eye::Right)?));
            graph.reset_head("[left][right]");
            graph.push(stack);
            to
        }
    };

    let target = spec.target_projection;
    let needs_v360 = !spec.is_identity_projection() || (target == ProjectionType::Flat && spec.viewport.is_some());

    if needs_v360 {
        if let (Some(motion), ProjectionType::Flat) = (spec.viewport_motion, target) {
            let start = spec.viewport.unwrap_or_default();
            graph.push(motion_commands(&start, &motion)?);
        }
        graph.push(v360_filter(spec, packing)?);
    } else if let Some(resolution) = spec.resolution {
        graph.push(format!("scale={}:{}", resolution.width, resolution.height));
    }

    Ok(graph.finish())
}

fn v360_filter(spec: &FilterSpec, packing: StereoMode) -> MediaResult<String> {
    let source = spec.source_projection;
    let target = spec.target_projection;

    let mut parts = vec![format!(
        "v360={}:{}",
        v360_format(source, false)?,
        v360_format(target, true)?
    )];

    if let Some(stereo) = stereo_format(packing) {
        parts.push(format!("in_stereo={}:out_stereo={}", stereo, stereo));
    }

    match target {
        ProjectionType::Flat => {
            let viewport = spec.viewport.unwrap_or_default();
            parts.push(format!("w={}:h={}", viewport.output_width, viewport.output_height));
            parts.push(format!(
                "yaw={}:pitch={}:roll={}:h_fov={}:v_fov={}",
                num(viewport.yaw),
                num(viewport.pitch),
                num(viewport.roll),
                num(viewport.fov),
                num(vertical_fov(&viewport))
            ));
        }
        ProjectionType::Stereographic => {
            push_resolution(&mut parts, spec.resolution);
            parts.push("pitch=-90:h_fov=360:v_fov=180".to_string());
        }
        ProjectionType::Fisheye => {
            push_resolution(&mut parts, spec.resolution);
            parts.push(format!(
                "h_fov={}:v_fov={}",
                num(FISHEYE_OUTPUT_FOV),
                num(FISHEYE_OUTPUT_FOV)
            ));
        }
        ProjectionType::Pannini => {
            push_resolution(&mut parts, spec.resolution);
            let (h, v) = target.default_fov();
            parts.push(format!("h_fov={}:v_fov={}", num(h), num(v)));
        }
        ProjectionType::Equirectangular
        | ProjectionType::HalfEquirectangular
        | ProjectionType::Cubemap { .. }
        | ProjectionType::Eac
        | ProjectionType::DualFisheye
        | ProjectionType::Cylindrical
        | ProjectionType::Mercator
        | ProjectionType::Unknown => push_resolution(&mut parts, spec.resolution),
    }

    if source == ProjectionType::DualFisheye {
        parts.push("ih_flip=1:iv_flip=1".to_string());
    }

    Ok(parts.join(":"))
}

fn push_resolution(parts: &mut Vec<String>, resolution: Option<Resolution>) {
    if let Some(resolution) = resolution {
        parts.push(format!("w={}:h={}", resolution.width, resolution.height));
    }
}

/// `sendcmd` script panning `v360` linearly from `start` to `motion.end`.
///
/// Yaw takes the short way around the seam.
fn motion_commands(start: &ViewportConfig, motion: &ViewportMotion) -> MediaResult<String> {
    if !(motion.duration.is_finite() && motion.duration > 0.0) {
        return Err(MediaError::unsupported_conversion(format!(
            "viewport motion duration must be positive, got {}",
            motion.duration
        )));
    }

    let end = &motion.end;
    let yaw_delta = vr360_models::wrap_degrees(end.yaw - start.yaw);
    let steps = ((motion.duration * MOTION_STEPS_PER_SECOND).ceil() as usize).clamp(1, MAX_MOTION_STEPS);

    let mut script = String::new();
    for step in 1..=steps {
        let t = step as f64 / steps as f64;
        let at = ViewportConfig {
            yaw: vr360_models::wrap_degrees(start.yaw + yaw_delta * t),
            pitch: start.pitch + (end.pitch - start.pitch) * t,
            roll: start.roll + (end.roll - start.roll) * t,
            fov: start.fov + (end.fov - start.fov) * t,
            ..*start
        };
        script.push_str(&format!(
            "{} v360 yaw {}, v360 pitch {}, v360 roll {}, v360 h_fov {}, v360 v_fov {};",
            num(motion.duration * t),
            num(at.yaw),
            num(at.pitch),
            num(at.roll),
            num(at.fov),
            num(vertical_fov(&at))
        ));
    }

    Ok(format!("sendcmd=c='{}'", script))
}

/// Build a row-major tiling graph over `inputs` video inputs.
///
/// Every cell is scaled to `cell`. Fails when there are fewer inputs than
/// cells; extra inputs are ignored.
pub fn build_grid_filter(shape: GridShape, cell: Resolution, inputs: usize) -> MediaResult<String> {
    let cells = shape.cell_count();
    if cells == 0 || cell.width == 0 || cell.height == 0 {
        return Err(MediaError::invalid_dimensions(format!(
            "grid {}x{} of {} cells is empty",
            shape.columns, shape.rows, cell
        )));
    }
    if inputs < cells {
        return Err(MediaError::invalid_dimensions(format!(
            "grid needs {} inputs, got {}",
            cells, inputs
        )));
    }

    let mut statements: Vec<String> = (0..cells)
        .map(|i| format!("[{}:v]scale={}:{},setsar=1[g{}]", i, cell.width, cell.height, i))
        .collect();

    let labels: String = (0..cells).map(|i| format!("[g{}]", i)).collect();
    if cells == 1 {
        statements.push(format!("{}null{}", labels, VIDEO_OUT));
    } else {
        let columns = shape.columns as usize;
        let layout = (0..cells)
            .map(|i| {
                let x = (i % columns) as u32 * cell.width;
                let y = (i / columns) as u32 * cell.height;
                format!("{}_{}", x, y)
            })
            .collect::<Vec<_>>()
            .join("|");
        statements.push(format!(
            "{}xstack=inputs={}:layout={}{}",
            labels, cells, layout, VIDEO_OUT
        ));
    }

    Ok(statements.join(";"))
}

/// Container tags describing a converted file. Flat outputs get none.
pub fn metadata_tags(projection: ProjectionType, stereo: StereoMode) -> Vec<(&'static str, String)> {
    if !projection.is_spherical() {
        return Vec::new();
    }

    let mut tags = vec![
        ("spherical", "1".to_string()),
        ("stitched", "1".to_string()),
        ("projection", projection.family().to_string()),
        ("stereo_mode", stereo.as_str().to_string()),
    ];
    if let Some(layout) = projection.cubemap_layout() {
        tags.push(("cubemap_layout", layout.as_str().to_string()));
    }
    tags
}
