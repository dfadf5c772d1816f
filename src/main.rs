
use anyhow::{anyhow, Context};
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{LevelFilter, debug, error, info};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use trioshard::caller::AlleleCountCaller;
use trioshard::cli::core::{Commands, FULL_VERSION, get_cli};
use trioshard::cli::make_examples::{MakeExamplesSettings, check_make_examples_settings};
use trioshard::cli::regions::{RegionsSettings, check_regions_settings};
use trioshard::collaborators::ReferenceSource;
use trioshard::contig_coverage::reconcile;
use trioshard::data_types::contig::{Contig, ContigMap};
use trioshard::data_types::labeling_metrics::LabelingMetrics;
use trioshard::data_types::ranges::Range;
use trioshard::data_types::sample::{Sample, SampleRole, stacking_order};
use trioshard::gvcf::GvcfBlockEmitter;
use trioshard::labeler::PositionalLabeler;
use trioshard::parsing::alignments::BamReadSource;
use trioshard::parsing::confident_regions::ConfidentRegions;
use trioshard::parsing::reference::FastaReference;
use trioshard::parsing::truth_variants::VcfTruthSource;
use trioshard::partition::plan_work_intervals;
use trioshard::pileup::PileupEncoder;
use trioshard::processor::{ProcessingMode, RegionOutput, RegionProcessor};
use trioshard::realigner::DwfaRealigner;
use trioshard::util::progress_bar::get_progress_style;
use trioshard::util::sharded_file::resolve_output;
use trioshard::writers::json_lines::JsonLinesWriter;
use trioshard::writers::region_summary::RegionSummaryWriter;
use trioshard::writers::run_info::{ResourceMetrics, RunInfo};
use trioshard::writers::work_intervals::write_work_intervals;

/// Work intervals per thread that are processed before their outputs are written
const INTERVALS_PER_THREAD: usize = 16;

fn init_logging(verbosity: u8) {
    let filter_level: LevelFilter = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();
}

fn init_thread_pool(threads: usize) {
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };
}

fn load_reference(settings_reference: &std::path::Path) -> Arc<dyn ReferenceSource> {
    info!("Pre-loading reference genome into memory...");
    match FastaReference::from_fasta(settings_reference) {
        Ok(rg) => Arc::new(rg),
        Err(e) => {
            error!("Error while loading reference genome: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }
}

/// Reconciles the contigs of the reference with every other input and builds the work intervals of this task
/// # Errors
/// * if too few reference bases are shared with the other inputs
/// * if a region entry cannot be parsed, or the calling regions are empty
/// * if the shard arguments are invalid
#[allow(clippy::too_many_arguments)]
fn reconcile_and_plan(
    reference: &dyn ReferenceSource, other_contigs: Vec<(String, Vec<Contig>)>,
    exclude_contigs: &[String], min_shared_fraction: f64,
    regions: &[String], exclude_regions: &[String], partition_size: u64,
    task_id: Option<i64>, num_shards: Option<i64>
) -> anyhow::Result<Vec<Range>> {
    let excluded: FxHashSet<String> = exclude_contigs.iter().cloned().collect();
    let common = reconcile(&reference.contigs(), &other_contigs, &excluded, min_shared_fraction)?;
    let contig_map = ContigMap::new(common);
    plan_work_intervals(&contig_map, regions, exclude_regions, partition_size, task_id, num_shards)
}

/// Opens the reads and builds one processor, every rayon split gets its own
fn build_processor(
    settings: &MakeExamplesSettings, reference: Arc<dyn ReferenceSource>, confident: Option<Arc<ConfidentRegions>>
) -> anyhow::Result<RegionProcessor> {
    let inputs = settings.sample_inputs();
    let roles: Vec<SampleRole> = inputs.iter().map(|(role, _r, _n)| *role).collect();
    let mut samples = Vec::with_capacity(inputs.len());
    for (role, reads_fn, sample_name) in inputs.into_iter() {
        let read_source = BamReadSource::open(&reads_fn)?;
        let sample_name = sample_name.unwrap_or_else(|| role.to_string());
        samples.push(Sample::new(
            role, sample_name, Box::new(read_source), stacking_order(&roles, role), settings.pileup_height(role)
        ));
    }

    let caller = AlleleCountCaller::new(settings.caller_config());
    let encoder = PileupEncoder::new(settings.pileup_config())?;
    let mut processor = RegionProcessor::new(
        settings.processor_config(), samples, reference, Box::new(caller), Box::new(encoder)
    )?;

    if settings.alt_aligned_pileup {
        processor = processor.with_realigner(Box::new(DwfaRealigner::new(settings.realigner_max_edit_distance)));
    }
    if settings.gvcf.is_some() {
        processor = processor.with_gvcf_emitter(Box::new(GvcfBlockEmitter::new(settings.gvcf_config())));
    }
    if settings.mode == ProcessingMode::Training {
        let truth_fn = settings.truth_variants.as_deref()
            .ok_or(anyhow!("truth_variants is required when in training mode."))?;
        let confident = confident.ok_or(anyhow!("confident_regions is required when in training mode."))?;
        let truth = VcfTruthSource::open(truth_fn)?;
        processor = processor.with_labeler(Box::new(PositionalLabeler::new(Box::new(truth), confident)));
    }
    Ok(processor)
}

/// Opens one JSON-lines stream per called role; training writes the child stream under the name as given
fn open_role_streams(
    spec: &str, task_index: usize, roles: &[SampleRole], mode: ProcessingMode
) -> anyhow::Result<BTreeMap<SampleRole, JsonLinesWriter>> {
    let mut ret = BTreeMap::new();
    for &role in roles.iter() {
        let role_name = match mode {
            ProcessingMode::Training => None,
            ProcessingMode::Calling => Some(role)
        };
        let role_path = resolve_output(spec, task_index, role_name)?;
        debug!("Opening {role} output at {role_path:?}");
        ret.insert(role, JsonLinesWriter::new(&role_path)?);
    }
    Ok(ret)
}

/// All output streams for one task
struct TaskOutputs {
    examples: BTreeMap<SampleRole, JsonLinesWriter>,
    candidates: Option<BTreeMap<SampleRole, JsonLinesWriter>>,
    gvcfs: Option<BTreeMap<SampleRole, JsonLinesWriter>>,
    region_summary: Option<RegionSummaryWriter>
}

impl TaskOutputs {
    fn open(settings: &MakeExamplesSettings) -> anyhow::Result<Self> {
        let roles = settings.called_roles();
        let task_index = settings.task_index();
        let examples = open_role_streams(&settings.examples, task_index, &roles, settings.mode)?;
        let candidates = settings.candidates.as_deref()
            .map(|spec| open_role_streams(spec, task_index, &roles, settings.mode))
            .transpose()?;
        let gvcfs = settings.gvcf.as_deref()
            .map(|spec| open_role_streams(spec, task_index, &roles, settings.mode))
            .transpose()?;
        let region_summary = settings.region_summary.as_deref()
            .map(RegionSummaryWriter::new)
            .transpose()?;
        Ok(Self { examples, candidates, gvcfs, region_summary })
    }

    /// Writes everything from one interval, in interval order
    fn write(&mut self, output: &RegionOutput) -> anyhow::Result<()> {
        for (role, records) in output.examples.iter() {
            if let Some(writer) = self.examples.get_mut(role) {
                writer.write_records(records)?;
            }
        }
        if let Some(streams) = self.candidates.as_mut() {
            for (role, candidates) in output.candidates.iter() {
                if let Some(writer) = streams.get_mut(role) {
                    writer.write_records(candidates)?;
                }
            }
        }
        if let Some(streams) = self.gvcfs.as_mut() {
            for (role, gvcfs) in output.gvcfs.iter() {
                if let Some(writer) = streams.get_mut(role) {
                    writer.write_records(gvcfs)?;
                }
            }
        }
        if let Some(writer) = self.region_summary.as_mut() {
            writer.write_region_summary(output)?;
        }
        Ok(())
    }

    /// Completes every stream first, then moves them all into place.
    /// On error, every stream that was not moved yet is removed.
    fn finish(self) -> anyhow::Result<()> {
        let mut closed = vec![];
        let streams = std::iter::once(self.examples)
            .chain(self.candidates)
            .chain(self.gvcfs);
        for stream in streams {
            for (role, writer) in stream.into_iter() {
                let description = format!("{} {role} records", writer.num_records());
                closed.push((description, writer.close()?));
            }
        }
        if let Some(writer) = self.region_summary {
            closed.push(("region summary".to_string(), writer.close()?));
        }

        for (description, output) in closed.into_iter() {
            let out_fn = output.persist()?;
            info!("Wrote {description} to {out_fn:?}");
        }
        Ok(())
    }
}

fn run_make_examples(settings: MakeExamplesSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    init_logging(settings.verbosity);
    let settings = match check_make_examples_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };
    init_thread_pool(settings.threads);
    let mut resource_metrics = ResourceMetrics::start(settings.threads);

    let reference = load_reference(&settings.reference_fn);

    // collect the contigs of every other input
    let mut other_contigs = vec![];
    for (role, reads_fn, _name) in settings.sample_inputs().into_iter() {
        match BamReadSource::open(&reads_fn) {
            Ok(source) => other_contigs.push((format!("{role} reads"), source.contigs())),
            Err(e) => {
                error!("Error while opening reads: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        };
    }
    if let Some(truth_fn) = settings.truth_variants.as_deref() {
        match VcfTruthSource::open(truth_fn) {
            Ok(source) => other_contigs.push(("truth variants".to_string(), source.contigs())),
            Err(e) => {
                error!("Error while opening truth variants: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    info!("Generating work intervals...");
    let intervals = match reconcile_and_plan(
        reference.as_ref(), other_contigs, &settings.exclude_contigs, settings.min_shared_contigs_basepairs,
        &settings.regions, &settings.exclude_regions, settings.partition_size,
        settings.task_id, settings.num_shards
    ) {
        Ok(i) => i,
        Err(e) => {
            error!("Error while generating work intervals: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let confident = settings.confident_regions.as_deref().map(|bed_fn| {
        info!("Pre-loading confident regions into memory...");
        match ConfidentRegions::from_bed(bed_fn) {
            Ok(c) => {
                info!("Loaded {} confident intervals.", c.len());
                Arc::new(c)
            },
            Err(e) => {
                error!("Error while loading confident regions: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    });

    info!("Opening output files...");
    let mut outputs = match TaskOutputs::open(&settings) {
        Ok(o) => o,
        Err(e) => {
            error!("Error while opening output files: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    // process in bounded chunks so the outputs can be streamed in interval order
    info!("Processing {} work intervals...", intervals.len());
    let chunk_size = settings.threads * INTERVALS_PER_THREAD;
    let progress = ProgressBar::new(intervals.len() as u64).with_style(get_progress_style());
    let mut labeling_metrics = LabelingMetrics::default();
    for chunk in intervals.chunks(chunk_size) {
        let results: Vec<anyhow::Result<RegionOutput>> = chunk.par_iter()
            .progress_with(progress.clone())
            .map_init(
                || build_processor(&settings, reference.clone(), confident.clone()),
                |processor, interval| {
                    match processor {
                        Ok(p) => p.process(interval)
                            .with_context(|| format!("Error while processing {interval}:")),
                        Err(e) => Err(anyhow!("Error while building region processor: {e:#}"))
                    }
                }
            )
            .collect();

        for result in results.into_iter() {
            let output = match result {
                Ok(o) => o,
                Err(e) => {
                    error!("{e:#}");
                    // exit skips destructors, the partial outputs are removed here
                    drop(outputs);
                    std::process::exit(exitcode::SOFTWARE);
                }
            };
            labeling_metrics += output.metrics;
            if let Err(e) = outputs.write(&output) {
                error!("Error while writing outputs: {e:#}");
                drop(outputs);
                std::process::exit(exitcode::IOERR);
            }
        }
    }
    progress.finish();

    if let Err(e) = outputs.finish() {
        error!("Error while finalizing outputs: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    info!("Candidates: {}", labeling_metrics.n_candidate_variant_sites);
    info!("Feature records: {}", labeling_metrics.n_feature_records);
    if settings.mode == ProcessingMode::Training {
        info!("Confident candidates: {}", labeling_metrics.n_confident_candidates);
        info!("Non-confident candidates: {}", labeling_metrics.n_non_confident_candidates);
        info!("Non-reference labels: {}", labeling_metrics.n_non_reference_labels);
    }

    // run summary goes next to the examples
    resource_metrics.elapsed_seconds = start_time.elapsed().as_secs_f64();
    resource_metrics.num_intervals = intervals.len() as u64;
    let examples_fn = match resolve_output(&settings.examples, settings.task_index(), None) {
        Ok(p) => p,
        Err(e) => {
            error!("Error while resolving the examples path: {e:#}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let run_info = RunInfo {
        version: FULL_VERSION.clone(),
        settings: settings.clone(),
        resource_metrics,
        labeling_metrics
    };
    match run_info.save(&examples_fn) {
        Ok(out_fn) => info!("Saved run info to {out_fn:?}"),
        Err(e) => {
            error!("Error while saving run info: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    info!("Processed {} work intervals in {} seconds.", intervals.len(), start_time.elapsed().as_secs_f64());
}

fn run_regions(settings: RegionsSettings) {
    init_logging(settings.verbosity);
    let settings = match check_regions_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let reference = load_reference(&settings.reference_fn);
    let mut other_contigs = vec![];
    for reads_fn in settings.reads.iter() {
        match BamReadSource::open(reads_fn) {
            Ok(source) => other_contigs.push((format!("{reads_fn:?}"), source.contigs())),
            Err(e) => {
                error!("Error while opening reads: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        };
    }

    let intervals = match reconcile_and_plan(
        reference.as_ref(), other_contigs, &settings.exclude_contigs, settings.min_shared_contigs_basepairs,
        &settings.regions, &settings.exclude_regions, settings.partition_size,
        settings.task_id, settings.num_shards
    ) {
        Ok(i) => i,
        Err(e) => {
            error!("Error while generating work intervals: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    let result = match settings.output.as_deref() {
        Some(out_fn) => {
            info!("Saving {} work intervals to {out_fn:?}...", intervals.len());
            std::fs::File::create(out_fn)
                .map_err(csv::Error::from)
                .and_then(|f| write_work_intervals(f, &intervals))
        },
        None => write_work_intervals(std::io::stdout().lock(), &intervals)
    };
    if let Err(e) = result {
        error!("Error while writing work intervals: {e}");
        std::process::exit(exitcode::IOERR);
    }
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::MakeExamples(settings) => {
            run_make_examples(*settings);
        },
        Commands::Regions(settings) => {
            run_regions(*settings);
        }
    }

    info!("Process finished successfully.");
}
