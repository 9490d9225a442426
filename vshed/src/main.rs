mod options;
mod progress;

use anyhow::{Context, Error as AnyError};
use clap::Parser;
use log::info;
use options::{CacheCommand, Cli, Command as CliCmd, LatLon};
use progress::make_progress_bar;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use terrain::{
    CancelToken, Coordinate, DirFetcher, ElevationSource, FileStore, HttpFetcher, TileCache,
    TileFetcher,
};
use viewshed::{CoverageArea, CoverageGrid, ViewshedConfig, ViewshedEngine};

fn main() -> Result<(), AnyError> {
    let Cli {
        tiles,
        cache_dir,
        config,
        overrides,
        cmd,
    } = Cli::parse();

    env_logger::init();

    let config = overrides.apply(load_config(config.as_deref())?);
    let source = Arc::new(ElevationSource::new(
        config.source_config(),
        fetcher(&tiles)?,
        Arc::new(FileStore::open(&cache_dir)?),
    ));
    let engine = ViewshedEngine::new(source.clone(), config);

    let res = match cmd {
        CliCmd::Viewshed { observer, out } => run_viewshed(&engine, observer, out.as_deref()),
        CliCmd::Simulate {
            observers,
            out,
            cells_out,
        } => run_simulate(&engine, &observers, out.as_deref(), cells_out.as_deref()),
        CliCmd::Download { center, radius } => run_download(&source, center, radius),
        CliCmd::Plan { center, radius } => run_plan(&source, center, radius),
        CliCmd::Cache(action) => run_cache(action, source.cache(), &cache_dir),
    };
    source.cache().flush();
    info!("tile cache: {:?}", source.cache().stats());
    res
}

fn load_config(path: Option<&Path>) -> Result<ViewshedConfig, AnyError> {
    match path {
        None => Ok(ViewshedConfig::default()),
        Some(path) => {
            let rdr = BufReader::new(File::open(path)?);
            serde_json::from_reader(rdr).with_context(|| format!("parsing {path:?}"))
        }
    }
}

fn fetcher(tiles: &str) -> Result<Arc<dyn TileFetcher>, AnyError> {
    if tiles.contains("://") {
        Ok(Arc::new(HttpFetcher::new(tiles)?))
    } else {
        Ok(Arc::new(DirFetcher::new(PathBuf::from(tiles))?))
    }
}

fn run_viewshed(
    engine: &ViewshedEngine,
    LatLon(observer): LatLon,
    out: Option<&Path>,
) -> Result<(), AnyError> {
    let pb = make_progress_bar(format!("Viewshed {observer}"), engine.config().ray_count() as u64);
    let handle = engine.spawn(observer);
    // Updates from different rays can arrive out of order.
    for _update in handle.progress() {
        pb.inc(1);
    }
    let result = handle.join()?;
    pb.finish_and_clear();

    let grid = CoverageGrid::around(engine.config(), observer);
    let cells = grid.to_grid(&result);
    info!(
        "{} visible points in {} cells, {:?}",
        result.visible_points.len(),
        cells.len(),
        result.duration
    );
    write_output(out, &grid.to_geojson(&cells))
}

fn run_simulate(
    engine: &ViewshedEngine,
    observers: &[LatLon],
    out: Option<&Path>,
    cells_out: Option<&Path>,
) -> Result<(), AnyError> {
    let cancel = CancelToken::new();
    let origin = observers.first().map_or(Coordinate::new(0.0, 0.0), |LatLon(c)| *c);
    let mut area = CoverageArea::new(CoverageGrid::around(engine.config(), origin));
    let pb = make_progress_bar("Simulating".to_owned(), observers.len() as u64);
    for LatLon(observer) in observers {
        let result = engine.calculate(*observer, &cancel, None)?;
        let before = area.len();
        area.record(&result);
        info!("{observer}: {} new cells", area.len() - before);
        pb.inc(1);
    }
    pb.finish_and_clear();
    info!(
        "covered {} cells, {:.0} m²",
        area.len(),
        area.total_area_m2()
    );

    if let Some(path) = cells_out {
        serde_json::to_writer(File::create(path)?, &area)?;
    }
    write_output(out, &area.to_geojson())
}

fn run_download(source: &ElevationSource, LatLon(center): LatLon, radius: f64) -> Result<(), AnyError> {
    let total = source.tiles_for_region(center, radius).len();
    let pb = make_progress_bar(format!("Downloading {total} tiles"), total as u64);
    let progress = |_completed: usize, _total: usize| pb.inc(1);
    let finished = source.download_region(center, radius, Some(&progress), &CancelToken::new());
    pb.finish_and_clear();

    let count = source.cached_tile_count(center, radius);
    println!("{} of {} tiles cached", count.cached, count.total);
    if !finished {
        anyhow::bail!("download did not finish");
    }
    Ok(())
}

fn run_plan(source: &ElevationSource, LatLon(center): LatLon, radius: f64) -> Result<(), AnyError> {
    let mut stdout = std::io::stdout().lock();
    for key in source.tiles_for_region(center, radius) {
        let cached = if source.cache().has_tile(key) { "cached" } else { "missing" };
        writeln!(stdout, "{key},{cached}")?;
    }
    let count = source.cached_tile_count(center, radius);
    writeln!(stdout, "{} of {} tiles cached", count.cached, count.total)?;
    Ok(())
}

fn run_cache(action: CacheCommand, cache: &TileCache, cache_dir: &Path) -> Result<(), AnyError> {
    match action {
        CacheCommand::Info => {
            println!("{cache_dir:?}: {} bytes", cache.total_cached_bytes());
        }
        CacheCommand::Clear => {
            let bytes = cache.total_cached_bytes();
            cache.clear()?;
            println!("cleared {bytes} bytes from {cache_dir:?}");
        }
    }
    Ok(())
}

fn write_output(out: Option<&Path>, contents: &str) -> Result<(), AnyError> {
    match out {
        Some(path) => std::fs::write(path, contents)?,
        None => writeln!(std::io::stdout().lock(), "{contents}")?,
    }
    Ok(())
}
