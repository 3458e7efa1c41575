use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use serde_json::json;
use skinrig::animation::SkeletalAnimator;
use skinrig::import::{load_rig_from_gltf, SkinnedMeshData};
use skinrig::skinning::skin_position;
use skinrig::{ClipWindow, RigConfig, RigConfigOverrides};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

/// Clip defined when the config names none: the whole master timeline.
const FULL_TIMELINE_CLIP: &str = "full";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("rig_inspect error: {err:?}");
        process::exit(1);
    }
}

#[derive(Debug, Default)]
struct CliOptions {
    model: Option<PathBuf>,
    config: Option<PathBuf>,
    clip: Option<String>,
    time: f32,
    total_frame_count: Option<f32>,
    json: bool,
    show_help: bool,
}

struct BoneRow {
    name: String,
    index: usize,
    translation: Vec3,
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let model = options.model.clone().ok_or_else(|| anyhow!("missing <model.gltf> argument"))?;

    let mut config = match &options.config {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::default(),
    };
    let overrides = RigConfigOverrides { clip: options.clip.clone(), total_frame_count: options.total_frame_count };
    if !overrides.is_empty() {
        log::info!("command line overrides: {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }
    if config.clips.is_empty() {
        let window = ClipWindow::new(0.0, config.skeleton.total_frame_count);
        config.clips.insert(FULL_TIMELINE_CLIP.to_string(), window);
    }
    if config.initial_clip.is_none() {
        config.initial_clip = config.clips.keys().next().cloned();
    }

    let rig = load_rig_from_gltf(&model)?;
    let mut controller = config.animation_controller()?;
    controller.set_elapsed(options.time);

    let mut animator = SkeletalAnimator::new(rig.skeleton, rig.timeline, config.animator_settings())
        .context("Invalid animator settings")?;
    let (palette, animation_time) = if animator.timeline().duration > 0.0 {
        let (clip, window) = controller.active_window()?;
        let time = animator.animation_time(clip, window, options.time)?;
        (animator.evaluate(&controller)?.to_vec(), Some(time))
    } else {
        (animator.skeleton().bind_pose_palette(), None)
    };

    let rows: Vec<BoneRow> = animator
        .skeleton()
        .bones()
        .iter()
        .zip(&palette)
        .enumerate()
        .map(|(index, (bone, matrix))| BoneRow { name: bone.name.to_string(), index, translation: translation_of(matrix) })
        .collect();

    if options.json {
        report_json(&model, controller.active_clip(), options.time, animation_time, &rows, &rig.meshes, &palette)?;
    } else {
        report_text(&model, controller.active_clip(), options.time, animation_time, &rows, &rig.meshes, &palette)?;
    }
    Ok(())
}

fn print_usage() {
    eprintln!(
        "Rig Inspect

Usage:
  rig_inspect <model.gltf> [--config <rig.json>] [--clip <name>] [--time <seconds>]
              [--frames <total_frame_count>] [--json]

Loads a skinned glTF model, evaluates the selected clip at the given time
and prints the bone palette (translation of each final matrix).
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(flag_value(&mut iter, arg)?)),
            "--clip" => options.clip = Some(flag_value(&mut iter, arg)?.to_string()),
            "--time" => {
                let value = flag_value(&mut iter, arg)?;
                options.time = value.parse().with_context(|| format!("invalid --time value '{value}'"))?;
            }
            "--frames" => {
                let value = flag_value(&mut iter, arg)?;
                let frames: f32 =
                    value.parse().with_context(|| format!("invalid --frames value '{value}'"))?;
                options.total_frame_count = Some(frames);
            }
            "--json" => options.json = true,
            "--help" | "-h" => options.show_help = true,
            _ if arg.starts_with("--") => {
                return Err(anyhow!("unknown flag '{arg}'"));
            }
            _ => {
                if options.model.is_some() {
                    return Err(anyhow!("unexpected extra argument '{arg}'"));
                }
                options.model = Some(PathBuf::from(arg));
            }
        }
    }
    Ok(options)
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a str> {
    iter.next().map(String::as_str).ok_or_else(|| anyhow!("flag '{flag}' expects a value"))
}

fn translation_of(matrix: &Mat4) -> Vec3 {
    matrix.w_axis.truncate()
}

fn first_vertex(mesh: &SkinnedMeshData, palette: &[Mat4]) -> Result<Option<Vec3>> {
    let (Some(position), Some(influence)) = (mesh.positions.first(), mesh.influences.first()) else {
        return Ok(None);
    };
    if influence.influence_count() == 0 {
        return Ok(Some(*position));
    }
    let skinned = skin_position(*position, influence, palette)
        .with_context(|| format!("Failed to skin mesh '{}'", mesh.name))?;
    Ok(Some(skinned))
}

fn report_text(
    model: &Path,
    clip: Option<&str>,
    time: f32,
    animation_time: Option<f32>,
    rows: &[BoneRow],
    meshes: &[SkinnedMeshData],
    palette: &[Mat4],
) -> Result<()> {
    println!("{}", model.display());
    match animation_time {
        Some(ticks) => println!("clip '{}' at {time:.3}s (tick {ticks:.3})", clip.unwrap_or("-")),
        None => println!("bind pose (no animation)"),
    }
    for row in rows {
        let t = row.translation;
        println!("  [{:>3}] {:<24} {:>9.4} {:>9.4} {:>9.4}", row.index, row.name, t.x, t.y, t.z);
    }
    for mesh in meshes {
        match first_vertex(mesh, palette)? {
            Some(v) => println!(
                "mesh '{}' #{}: {} vertices, first vertex at ({:.4}, {:.4}, {:.4})",
                mesh.name, mesh.primitive, mesh.vertex_count, v.x, v.y, v.z
            ),
            None => println!("mesh '{}' #{}: no vertices", mesh.name, mesh.primitive),
        }
    }
    Ok(())
}

fn report_json(
    model: &Path,
    clip: Option<&str>,
    time: f32,
    animation_time: Option<f32>,
    rows: &[BoneRow],
    meshes: &[SkinnedMeshData],
    palette: &[Mat4],
) -> Result<()> {
    let bones: Vec<_> = rows
        .iter()
        .map(|row| {
            json!({
                "index": row.index,
                "name": row.name,
                "translation": row.translation.to_array(),
            })
        })
        .collect();
    let mut mesh_values = Vec::with_capacity(meshes.len());
    for mesh in meshes {
        mesh_values.push(json!({
            "name": mesh.name,
            "primitive": mesh.primitive,
            "material_index": mesh.material_index,
            "vertex_count": mesh.vertex_count,
            "first_vertex": first_vertex(mesh, palette)?.map(|v| v.to_array()),
        }));
    }
    let json_value = json!({
        "model": model.display().to_string(),
        "clip": clip,
        "time": time,
        "animation_time": animation_time,
        "bones": bones,
        "meshes": mesh_values,
    });
    println!("{json_value}");
    Ok(())
}
