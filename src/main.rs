use anyhow::{bail, Context, Result};
use log::info;
use polypart::complex::{initial_bound, CellComplex};
use polypart::config::Config;
use polypart::export;
use polypart::label::MeshLabeler;
use polypart::primitive::Primitives;
use polypart::surface;
use polypart::utils::{timeit, Rng};
use polypart::vertex_group::VertexGroup;
use std::path::Path;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(error) = run() {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).context("usage: polypart <config.json>")?;
    let config = Config::from_path(Path::new(&config_path))?;

    let vertex_group = VertexGroup::load(&config.input, config.merge_duplicates)?;
    let mut primitives = Primitives::from_vertex_group(&vertex_group)?;
    primitives.append_unbounded(&config.additional_planes)?;
    let mut rng = Rng::seeded(config.seed);
    primitives.prioritise(config.prioritise.into(), &mut rng);

    let bound = initial_bound(&vertex_group.points, config.initial_padding)?;
    let mut complex = CellComplex::new(primitives, bound)?;
    if config.exhaustive {
        let workers = config.num_workers.unwrap_or_else(num_cpus::get);
        timeit("exhaustive construction", || complex.construct_exhaustive(workers))?;
    } else {
        timeit("adaptive construction", || {
            complex.construct_partition(config.mode.into(), config.ordering.into(), config.th)
        })?;
    }
    complex.print_info();

    if let Some(mesh) = &config.mesh {
        let labeler = MeshLabeler::from_obj(mesh)?;
        complex.label_cells(&labeler, config.n_test_points)?;
        if config.simplify {
            complex.simplify();
            info!("simplified down to {} cells", complex.num_cells());
        }
        complex.construct_polygons();
        if let Some(path) = &config.surface {
            surface::extract_surface(&complex, path)?;
            info!("surface written to {}", path.display());
        }
        if let Some(path) = &config.soup {
            surface::extract_soup(&complex, path)?;
            info!("soup written to {}", path.display());
        }
        if let Some(path) = &config.cells {
            export::extract_in_cells(&complex, path)?;
        }
    } else if config.surface.is_some() || config.soup.is_some() || config.cells.is_some() {
        bail!("surface extraction requires a reference mesh for labeling");
    }

    if let Some(path) = &config.partition {
        export::extract_partition(&complex, path, None)?;
        info!("partition written to {}", path.display());
    }
    Ok(())
}
