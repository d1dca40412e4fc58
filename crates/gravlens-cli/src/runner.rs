//! Job runner: builds the lens plane, evaluates it and writes the outputs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::Array4;
use serde::Serialize;

use gravlens_compute::BackendGate;
use gravlens_core::models::{LensParams, ModelKind};
use gravlens_core::{LensComponent, LensPlane, PlaneFields};
use gravlens_geometry::PixelGrid;

use crate::config::{ComponentConfig, JobConfig};

/// Results from a job run.
pub struct RunOutput {
    pub plane: LensPlane,
    pub fields: Arc<PlaneFields>,
}

/// Build the lens plane described by a job, without evaluating it.
pub fn build_plane(job: &JobConfig) -> Result<LensPlane> {
    job.cosmology
        .validate()
        .context("Invalid [cosmology] section")?;
    let grid = PixelGrid::new(job.grid.size, job.grid.angular_radius)
        .context("Invalid [grid] section")?;
    let mut plane = LensPlane::with_distances(job.lens.redshift, grid, Arc::new(job.cosmology.clone()))?;

    if let Some(project) = &job.lens.project {
        plane
            .open_project(project)
            .with_context(|| format!("Failed to open project {}", project.display()))?;
    }

    for (i, component) in job.lens.component.iter().enumerate() {
        let component = build_component(component, &mut plane)
            .with_context(|| format!("Invalid lens component #{}", i + 1))?;
        plane.add_component(component)?;
    }

    for (i, source) in job.source.iter().enumerate() {
        plane
            .add_source(source.redshift, source.origin, source.radius)
            .with_context(|| format!("Invalid source #{}", i + 1))?;
    }

    log::debug!("Built {:?}", plane);
    Ok(plane)
}

fn build_component(config: &ComponentConfig, plane: &mut LensPlane) -> Result<LensComponent> {
    let kind: ModelKind = config.model.parse()?;
    let params = LensParams::from_map(kind, &config.params)?;
    if let LensParams::Import { file } = &params {
        if !plane.imports().contains(file) {
            plane.load_import(file)?;
        }
    }

    Ok(LensComponent::new(params)
        .with_strength(config.strength)
        .with_translation(config.translation[0], config.translation[1])
        .with_angle(config.angle))
}

/// Run a full job from a parsed configuration.
pub fn run_job(job: &JobConfig) -> Result<RunOutput> {
    let mut plane = build_plane(job)?;
    println!(
        "Lens: z = {} (D_d = {:.2} Mpc), {} components",
        plane.redshift(),
        plane.d_d(),
        plane.components().len()
    );
    for (i, source) in plane.sources().iter().enumerate() {
        println!(
            "  Source {}: z = {} (D_s = {:.2} Mpc, D_ds = {:.2} Mpc)",
            i, source.redshift, source.d_s, source.d_ds
        );
    }

    let gate = BackendGate::new();
    pollster::block_on(gate.open_cpu(job.compute.threads))?;
    let backend = gate.try_backend()?;
    println!("Backend: {}", backend.device_info().name);

    let start = Instant::now();
    let fields = pollster::block_on(plane.recompute_when_ready(&gate))?;
    println!(
        "Evaluated {}x{} grid in {:.2?}",
        plane.grid().size,
        plane.grid().size,
        start.elapsed()
    );

    Ok(RunOutput { plane, fields })
}

/// Write every output the job asks for into `out_dir`.
pub fn write_outputs(output: &RunOutput, job: &JobConfig, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create output directory {}", out_dir.display()))?;
    let settings = &job.output;

    if settings.save_alpha {
        write_alpha_csv(output, &out_dir.join("alpha.csv"))?;
    }
    if settings.save_derivatives {
        write_derivatives_csv(output, &out_dir.join("derivatives.csv"))?;
    }
    for i in 0..output.fields.critical.len() {
        if settings.save_q {
            write_q_csv(output, i, &out_dir.join(format!("q_source{}.csv", i)))?;
        }
        if settings.save_critical {
            write_critical_csv(output, i, &out_dir.join(format!("critical_source{}.csv", i)))?;
        }
        if settings.save_images {
            write_images_csv(output, i, &out_dir.join(format!("images_source{}.csv", i)))?;
        }
    }
    if settings.save_components {
        write_components_json(output, &out_dir.join("components.json"))?;
    }
    if settings.save_summary {
        write_summary_json(output, &out_dir.join("summary.json"))?;
    }
    if settings.save_project {
        let path = out_dir.join("project.json");
        output.plane.save_project(&path)?;
        println!("Project written to: {}", path.display());
    }
    if settings.export_merged {
        let path = out_dir.join("merged.json");
        output.plane.export_merged(&path)?;
        println!("Merged lens written to: {}", path.display());
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_header(file: &mut impl Write, title: &str, output: &RunOutput) -> Result<()> {
    let grid = output.plane.grid();
    writeln!(file, "# gravlens: {}", title)?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# lens redshift: {}", output.plane.redshift())?;
    writeln!(
        file,
        "# grid: {}x{}, angular radius {} arcsec",
        grid.size, grid.size, grid.angular_radius
    )?;
    writeln!(file, "#")?;
    Ok(())
}

/// Write the composite deflection to a CSV file.
pub fn write_alpha_csv(output: &RunOutput, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    write_header(&mut file, "Deflection Field", output)?;
    writeln!(file, "row,col,theta_x_arcsec,theta_y_arcsec,alpha_x_arcsec,alpha_y_arcsec")?;

    let lens = &output.fields.lens;
    let n = lens.grid.size;
    for row in 0..n {
        for col in 0..n {
            let [x, y] = lens.grid.position(col, row);
            let a = lens.alpha_at(row, col);
            writeln!(file, "{},{},{:.6},{:.6},{:.6e},{:.6e}", row, col, x, y, a[0], a[1])?;
        }
    }

    println!("Deflection field written to: {}", path.display());
    Ok(())
}

/// Write the composite Jacobian to a CSV file.
pub fn write_derivatives_csv(output: &RunOutput, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    write_header(&mut file, "Deflection Jacobian", output)?;
    writeln!(file, "row,col,theta_x_arcsec,theta_y_arcsec,axx,ayy,axy")?;

    let lens = &output.fields.lens;
    let n = lens.grid.size;
    for row in 0..n {
        for col in 0..n {
            let [x, y] = lens.grid.position(col, row);
            let d = lens.derivatives_at(row, col);
            writeln!(
                file,
                "{},{},{:.6},{:.6},{:.6e},{:.6e},{:.6e}",
                row, col, x, y, d.xx, d.yy, d.xy
            )?;
        }
    }

    println!("Jacobian written to: {}", path.display());
    Ok(())
}

/// Write the lens determinant and magnification for one source.
pub fn write_q_csv(output: &RunOutput, source: usize, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    write_header(&mut file, "Lens Mapping Determinant", output)?;
    let critical = &output.fields.critical[source];
    writeln!(file, "# source {}: D_ds/D_s = {:.6}", source, critical.distance_ratio)?;
    writeln!(file, "row,col,theta_x_arcsec,theta_y_arcsec,q,magnification")?;

    let grid = output.fields.lens.grid;
    let magnification = critical.magnification();
    for ((row, col), q) in critical.q.indexed_iter() {
        let [x, y] = grid.position(col, row);
        writeln!(
            file,
            "{},{},{:.6},{:.6},{:.6e},{:.6e}",
            row,
            col,
            x,
            y,
            q,
            magnification[[row, col]]
        )?;
    }

    println!("Determinant (source {}) written to: {}", source, path.display());
    Ok(())
}

/// Write critical pixels and their caustic images for one source.
pub fn write_critical_csv(output: &RunOutput, source: usize, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    write_header(&mut file, "Critical Lines and Caustics", output)?;
    writeln!(file, "col,row,theta_x_arcsec,theta_y_arcsec,beta_x_arcsec,beta_y_arcsec")?;

    let lens = &output.fields.lens;
    let critical = &output.fields.critical[source];
    let pixels = critical.critical_pixels();
    let caustics = critical.caustic_points(lens);
    for ([col, row], beta) in pixels.iter().zip(&caustics) {
        let [x, y] = lens.grid.position(*col as usize, *row as usize);
        writeln!(
            file,
            "{},{},{:.6},{:.6},{:.6},{:.6}",
            col, row, x, y, beta[0], beta[1]
        )?;
    }

    println!(
        "{} critical pixels (source {}) written to: {}",
        pixels.len(),
        source,
        path.display()
    );
    Ok(())
}

/// Write the pixels that image a source's aperture.
pub fn write_images_csv(output: &RunOutput, source: usize, path: &Path) -> Result<()> {
    let mut file = create(path)?;
    write_header(&mut file, "Image Pixels", output)?;
    writeln!(file, "row,col,theta_x_arcsec,theta_y_arcsec")?;

    let lens = &output.fields.lens;
    let mask = lens.image_mask(output.plane.source(source)?);
    let mut count = 0;
    for ((row, col), &hit) in mask.indexed_iter() {
        if !hit {
            continue;
        }
        let [x, y] = lens.grid.position(col, row);
        writeln!(file, "{},{},{:.6},{:.6}", row, col, x, y)?;
        count += 1;
    }

    println!("{} image pixels (source {}) written to: {}", count, source, path.display());
    Ok(())
}

/// Write per-component fields to a JSON file.
pub fn write_components_json(output: &RunOutput, path: &Path) -> Result<()> {
    let components = &output.fields.components;
    let dump = ComponentDump {
        alpha: &components.alpha,
        derivatives: &components.derivatives,
    };
    let json = serde_json::to_string(&dump)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Component fields written to: {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct ComponentDump<'a> {
    alpha: &'a Array4<f32>,
    derivatives: &'a Array4<f32>,
}

#[derive(Serialize)]
struct SourceSummary {
    redshift: f64,
    d_s: f64,
    d_ds: f64,
    distance_ratio: f64,
    critical_pixels: usize,
    image_pixels: usize,
}

#[derive(Serialize)]
struct RunSummary {
    version: &'static str,
    redshift: f64,
    d_d: f64,
    grid: PixelGrid,
    components: usize,
    generation: u64,
    sources: Vec<SourceSummary>,
}

/// Write a run summary to a JSON file.
pub fn write_summary_json(output: &RunOutput, path: &Path) -> Result<()> {
    let plane = &output.plane;
    let fields = &output.fields;
    let sources = plane
        .sources()
        .iter()
        .zip(&fields.critical)
        .map(|(source, critical)| SourceSummary {
            redshift: source.redshift,
            d_s: source.d_s,
            d_ds: source.d_ds,
            distance_ratio: critical.distance_ratio,
            critical_pixels: critical.critical_pixels().len(),
            image_pixels: fields.lens.image_mask(source).iter().filter(|&&hit| hit).count(),
        })
        .collect();

    let summary = RunSummary {
        version: env!("CARGO_PKG_VERSION"),
        redshift: plane.redshift(),
        d_d: plane.d_d(),
        grid: plane.grid(),
        components: plane.components().len(),
        generation: fields.generation,
        sources,
    };
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Summary written to: {}", path.display());
    Ok(())
}
