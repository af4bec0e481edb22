use anyhow::{bail, Context, Result};
use tilecover::{
    BlobStore, CancellationToken, DiskStore, GeoJsonFiles, MemStore, Pipeline, SvgRenderer, SvgStyle,
    SweepOptions, TileAggregator,
};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RenderArgs) -> Result<()> {
    // Configuration errors abort before any record is read.
    let engine = super::coverage_engine(&args.coverage, "15")?;
    let style = match &args.style {
        Some(path) => SvgStyle::from_path(path)?,
        None => SvgStyle::default(),
    };
    let renderer = SvgRenderer::new(style)?;
    let output = DiskStore::new(&args.output)
        .with_context(|| format!("[render] Failed to open output {}", args.output.display()))?;

    match (&args.work_dir, args.in_memory) {
        (_, true) => render_with(args, &engine, &renderer, &output, MemStore::new()),
        (Some(dir), false) => {
            let work = DiskStore::new(dir)
                .with_context(|| format!("[render] Failed to open work dir {}", dir.display()))?;
            render_with(args, &engine, &renderer, &output, work)
        }
        (None, false) => bail!("[render] --work-dir or --in-memory is required"),
    }
}

fn render_with<S: BlobStore>(
    args: &crate::cli::RenderArgs,
    engine: &tilecover::CoverageEngine,
    renderer: &SvgRenderer,
    output: &DiskStore,
    work: S,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut aggregator = TileAggregator::new(work);
    let files = GeoJsonFiles::new(args.coverage.paths.iter());

    let summary = Pipeline::new(engine, &aggregator)
        .with_crop_policy(args.crop_policy)
        .accumulate_all(files.records(), &cancel);

    for failure in &summary.failures {
        eprintln!("[render] {}: {}", failure.record, failure.error);
    }
    eprintln!(
        "[render] accumulated {} feature(s) into {} fragment(s), {} partial, {} failed, {} crop failure(s)",
        summary.features_ok, summary.fragments, summary.partial, summary.features_failed, summary.crop_failures,
    );

    // Every merge has finished once `accumulate_all` returns; the sweep needs `&mut` access.
    let options = SweepOptions { fail_on_render_error: args.fail_on_render_error, ..Default::default() };
    let report = aggregator.sweep_and_render(renderer, output, &options)?;

    eprintln!(
        "[render] rendered {} tile(s) to {}, {} unreadable, {} render failure(s), {} delete failure(s)",
        report.rendered, output.root().display(), report.read_failures, report.render_failures, report.delete_failures,
    );

    let incomplete = summary.features_failed + summary.partial + summary.skipped;
    if incomplete > 0 || report.read_failures > 0 || report.render_failures > 0 {
        bail!("[render] completed with failures");
    }
    Ok(())
}
