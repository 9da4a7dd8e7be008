use aemsection::core::{
    Axis, ColumnVariable, GridResolution, GridVariable, LineSection, RasterVariable, SectionGrid, SectionParts,
};
use aemsection::{InversionSource, SectionCache, SectionError};
use ndarray::{array, Array2};
use std::io::Write;
use tempfile::TempDir;

fn rj_section() -> LineSection {
    let mut p50 = Array2::from_elem((3, 4), 0.05);
    p50[[2, 3]] = f64::NAN;
    let parts = SectionParts::new(array![0.0, 50.0, 100.0, 150.0], array![120.0, 118.0, 116.0])
        .with_column(ColumnVariable::Elevation, array![120.0, 119.5, 119.0, 118.0])
        .with_column(ColumnVariable::Easting, array![500.0, 550.0, 600.0, 650.0])
        .with_column(ColumnVariable::Northing, array![7000.0, 7000.0, 7001.0, 7001.0])
        .with_column(ColumnVariable::MisfitLowest, array![1.1, 0.9, 1.3, 1.0])
        .with_raster(RasterVariable::ConductivityP50, p50);
    LineSection::new(parts).expect("valid section")
}

fn rj_grid() -> SectionGrid {
    let mut grid = SectionGrid::new(
        InversionSource::Stochastic,
        GridResolution {
            horizontal: 50.0,
            vertical: 2.0,
        },
    );
    grid.insert(200101, rj_section());
    grid.insert(912011, rj_section());
    grid
}

#[test]
fn test_grid_survives_the_cache() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let cache = SectionCache::new(dir.path().join("rj"));
    let grid = rj_grid();

    assert_eq!(cache.save_grid(&grid).expect("save grid"), 2);
    assert!(cache.path_for(InversionSource::Stochastic, 912011).exists());

    let requested = GridVariable::parse_list(&["conductivity_p50", "misfit_lowest"]).unwrap();
    let loaded = cache
        .load_grid(InversionSource::Stochastic, &[200101, 912011], &requested)
        .expect("load grid");

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.resolution(), grid.resolution());
    assert_eq!(
        loaded.axis(200101, Axis::Distance).unwrap(),
        grid.axis(200101, Axis::Distance).unwrap()
    );
    let p50 = loaded.variable(912011, RasterVariable::ConductivityP50).unwrap();
    assert!(p50[[2, 3]].is_nan());
    assert_eq!(p50[[0, 0]], 0.05);
    assert_eq!(
        loaded.scalar_column(200101, ColumnVariable::Northing).unwrap().to_vec(),
        vec![7000.0, 7000.0, 7001.0, 7001.0]
    );
}

#[test]
fn test_missing_variable_fails_the_load() {
    let dir = TempDir::new().unwrap();
    let cache = SectionCache::new(dir.path());
    cache.save_grid(&rj_grid()).unwrap();

    let requested = GridVariable::parse_list(&["conductivity_p50", "interface_depth_histogram"]).unwrap();
    let err = cache
        .load_grid(InversionSource::Stochastic, &[], &requested)
        .unwrap_err();
    assert!(matches!(
        err,
        SectionError::VariableNotLoaded { ref variable, .. } if variable == "interface_depth_histogram"
    ));
}

#[test]
fn test_unreadable_file_is_not_user_facing() {
    let dir = TempDir::new().unwrap();
    let cache = SectionCache::new(dir.path());
    cache.save_grid(&rj_grid()).unwrap();

    let mut file = std::fs::File::create(cache.path_for(InversionSource::Stochastic, 912011)).unwrap();
    file.write_all(b"not a gzip stream").unwrap();
    drop(file);

    let err = cache
        .load_grid(InversionSource::Stochastic, &[], &[])
        .unwrap_err();
    assert!(!err.is_user_facing());
    println!("corrupt cache rejected: {}", err);
}

#[test]
fn test_sources_do_not_share_files() {
    let dir = TempDir::new().unwrap();
    let cache = SectionCache::new(dir.path());
    cache.save_grid(&rj_grid()).unwrap();

    assert!(cache.available_lines(InversionSource::Deterministic).unwrap().is_empty());
    assert!(matches!(
        cache.load_line(InversionSource::Deterministic, 200101, &[]),
        Err(SectionError::LineNotFound(200101))
    ));
}
