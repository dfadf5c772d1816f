
use anyhow::{bail, ensure, Context};
use derive_builder::Builder;
use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum_macros::EnumString;

use crate::collaborators::{CandidateCaller, HaplotypeRealigner, PileupImageCreator, ReferenceConfidenceEmitter, ReferenceSource, VariantLabeler};
use crate::data_types::candidate::Candidate;
use crate::data_types::feature_record::FeatureRecord;
use crate::data_types::labeling_metrics::LabelingMetrics;
use crate::data_types::ranges::Range;
use crate::data_types::reads::ReadRequirements;
use crate::data_types::sample::{Sample, SampleRole};
use crate::data_types::variants::Variant;
use crate::labeler::attach_label;
use crate::realigner::{align_to_all_haplotypes, HaplotypeAlignments};

/// Whether records are produced for inference or for training
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[derive(strum_macros::Display, EnumString, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Unlabeled records, optionally with gVCF blocks
    #[default]
    #[strum(ascii_case_insensitive, serialize = "calling")]
    #[clap(name = "calling")]
    Calling,
    /// Labeled records from a truth set
    #[strum(ascii_case_insensitive, serialize = "training")]
    #[clap(name = "training")]
    Training
}

/// Immutable settings for a region processor
#[derive(Builder, Clone, Debug, Serialize)]
#[builder(default)]
pub struct ProcessorConfig {
    /// Calling or training
    pub mode: ProcessingMode,
    /// Filters applied when loading reads
    pub read_requirements: ReadRequirements,
    /// The roles that get candidates and feature records
    pub called_roles: Vec<SampleRole>
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Calling,
            read_requirements: ReadRequirements::default(),
            called_roles: vec![SampleRole::Child]
        }
    }
}

/// Everything produced for one work interval, keyed by sample role
#[derive(Clone, Debug, Default, Serialize)]
pub struct RegionOutput {
    /// The interval that was processed
    pub region: Option<Range>,
    /// Candidates in caller order
    pub candidates: BTreeMap<SampleRole, Vec<Candidate>>,
    /// Feature records in candidate order, labeled when training
    pub examples: BTreeMap<SampleRole, Vec<FeatureRecord>>,
    /// Reference confidence records sorted by start
    pub gvcfs: BTreeMap<SampleRole, Vec<Variant>>,
    /// Number of reads kept for every sample
    pub read_counts: BTreeMap<SampleRole, usize>,
    /// Candidate and labeling counters
    pub metrics: LabelingMetrics
}

/// Runs the per-interval pipeline: read loading, candidate calling, realignment, encoding, and labeling.
/// A processor owns its samples, so only one interval is ever in flight per processor.
pub struct RegionProcessor {
    /// Settings
    config: ProcessorConfig,
    /// All samples, in input order
    samples: Vec<Sample>,
    /// Shared reference access
    reference: Arc<dyn ReferenceSource>,
    /// Proposes candidates from a sample
    caller: Box<dyn CandidateCaller>,
    /// Turns candidates into encoded images
    image_creator: Box<dyn PileupImageCreator>,
    /// Optional haplotype realignment, feeds the alt-aligned channels
    realigner: Option<Box<dyn HaplotypeRealigner>>,
    /// Optional reference confidence output
    gvcf_emitter: Option<Box<dyn ReferenceConfidenceEmitter>>,
    /// Required in training mode
    labeler: Option<Box<dyn VariantLabeler>>
}

impl std::fmt::Debug for RegionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionProcessor")
            .field("config", &self.config)
            .field("samples", &self.samples)
            .field("realigner", &self.realigner.is_some())
            .field("gvcf_emitter", &self.gvcf_emitter.is_some())
            .field("labeler", &self.labeler.is_some())
            .finish()
    }
}

impl RegionProcessor {
    /// Creates a processor without the optional collaborators
    /// # Arguments
    /// * `config` - processor settings
    /// * `samples` - every sample, pileup orders index into this list
    /// * `reference` - shared reference access
    /// * `caller` - candidate generation
    /// * `image_creator` - feature encoding
    /// # Errors
    /// * if a sample's pileup order points outside of `samples`
    /// * if a called role has no sample
    pub fn new(
        config: ProcessorConfig, samples: Vec<Sample>, reference: Arc<dyn ReferenceSource>,
        caller: Box<dyn CandidateCaller>, image_creator: Box<dyn PileupImageCreator>
    ) -> anyhow::Result<Self> {
        for sample in samples.iter() {
            ensure!(
                sample.order().iter().all(|&i| i < samples.len()),
                "Pileup order {:?} of {} refers to a missing sample", sample.order(), sample.role()
            );
        }
        for role in config.called_roles.iter() {
            ensure!(samples.iter().any(|s| s.role() == *role), "No sample provided for called role {role}");
        }
        Ok(Self {
            config,
            samples,
            reference,
            caller,
            image_creator,
            realigner: None,
            gvcf_emitter: None,
            labeler: None
        })
    }

    pub fn with_realigner(mut self, realigner: Box<dyn HaplotypeRealigner>) -> Self {
        self.realigner = Some(realigner);
        self
    }

    pub fn with_gvcf_emitter(mut self, gvcf_emitter: Box<dyn ReferenceConfidenceEmitter>) -> Self {
        self.gvcf_emitter = Some(gvcf_emitter);
        self
    }

    pub fn with_labeler(mut self, labeler: Box<dyn VariantLabeler>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    /// Processes one work interval to completion.
    /// # Arguments
    /// * `region` - the interval to process
    /// # Errors
    /// * if training without a labeler
    /// * if any stage fails, including a reference mismatch during realignment; no partial output is returned
    pub fn process(&mut self, region: &Range) -> anyhow::Result<RegionOutput> {
        let training = self.config.mode == ProcessingMode::Training;
        if training && self.labeler.is_none() {
            bail!("A labeler is required when in training mode.");
        }

        let mut output = RegionOutput {
            region: Some(region.clone()),
            ..Default::default()
        };

        // replace every sample buffer before anything else touches the reads
        for sample in self.samples.iter_mut() {
            let num_reads = sample.load_reads(region, &self.config.read_requirements)
                .with_context(|| format!("Error while loading reads for {} in {region}:", sample.role()))?;
            output.read_counts.insert(sample.role(), num_reads);
        }

        let called_indices: Vec<usize> = self.samples.iter().enumerate()
            .filter(|(_i, s)| self.config.called_roles.contains(&s.role()))
            .map(|(i, _s)| i)
            .collect();
        for sample_index in called_indices.into_iter() {
            let role = self.samples[sample_index].role();
            let candidates = self.caller.call(region, &self.samples[sample_index], self.reference.as_ref())
                .with_context(|| format!("Error while calling candidates for {role} in {region}:"))?;
            debug!("{region} {role}: {} candidates", candidates.len());
            output.metrics.n_candidate_variant_sites += candidates.len() as u64;

            let labels = match (training, self.labeler.as_mut()) {
                (true, Some(labeler)) => {
                    let labels = labeler.label_candidates(&candidates, region)?;
                    ensure!(
                        labels.len() == candidates.len(),
                        "Labeler returned {} labels for {} candidates", labels.len(), candidates.len()
                    );
                    output.metrics.add_labels(&labels);
                    Some(labels)
                },
                _ => None
            };

            let mut examples = vec![];
            for (candidate_index, candidate) in candidates.iter().enumerate() {
                let label = labels.as_ref().map(|l| &l[candidate_index]);
                if label.is_some_and(|l| !l.is_confident()) {
                    trace!("Skipping non-confident candidate at {}", candidate.variant().range());
                    continue;
                }

                let records = self.create_pileup_examples(candidate, sample_index)?;
                for record in records.into_iter() {
                    let record = match label {
                        Some(l) => attach_label(record, l)?,
                        None => record
                    };
                    examples.push(record);
                }
            }
            output.metrics.n_feature_records += examples.len() as u64;

            if let Some(emitter) = self.gvcf_emitter.as_ref() {
                let gvcfs = emitter.emit(region, &self.samples[sample_index], &candidates, self.reference.as_ref())
                    .with_context(|| format!("Error while creating gVCF records for {role} in {region}:"))?;
                output.gvcfs.insert(role, gvcfs);
            }
            output.candidates.insert(role, candidates);
            output.examples.insert(role, examples);
        }

        Ok(output)
    }

    /// Builds the haplotypes for every ALT of a candidate and realigns the sample's reads to them.
    /// Returns None when no realigner is configured.
    /// # Errors
    /// * `ReferenceMismatchError` if the candidate REF disagrees with the reference
    pub fn align_to_all_haplotypes(&self, candidate: &Candidate, sample_index: usize) -> anyhow::Result<Option<HaplotypeAlignments>> {
        let Some(realigner) = self.realigner.as_ref() else {
            return Ok(None);
        };
        let alignments = align_to_all_haplotypes(
            candidate.variant(), self.samples[sample_index].reads(), self.reference.as_ref(),
            realigner.as_ref(), self.image_creator.width()
        )?;
        Ok(Some(alignments))
    }

    /// Encodes a candidate into zero or more feature records, in the order the image creator returns them
    /// # Arguments
    /// * `candidate` - the candidate to encode
    /// * `sample_index` - index of the called sample, its pileup order decides the stacking
    pub fn create_pileup_examples(&self, candidate: &Candidate, sample_index: usize) -> anyhow::Result<Vec<FeatureRecord>> {
        let haplotypes = self.align_to_all_haplotypes(candidate, sample_index)?;
        let stacked: Vec<&Sample> = self.samples[sample_index].order().iter()
            .map(|&i| &self.samples[i])
            .collect();

        let called_role = self.samples[sample_index].role();
        let encoded = self.image_creator.encode(
            candidate, called_role, &stacked, haplotypes.as_ref(), self.reference.as_ref()
        )?;
        let records = match encoded {
            Some(images) => images.into_iter()
                .map(|image| FeatureRecord::new(candidate.variant().clone(), image))
                .collect(),
            None => {
                trace!("No image for candidate at {}", candidate.variant().range());
                vec![]
            }
        };
        Ok(records)
    }

    // getters
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::*;
    use crate::labeler::UnconfidentLabelError;
    use crate::realigner::ReferenceMismatchError;

    const REFERENCE: &[u8] = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";

    struct Harness {
        caller_calls: Arc<std::sync::Mutex<Vec<(Range, usize)>>>,
        image_calls: Arc<std::sync::Mutex<Vec<(u64, Vec<String>, bool)>>>,
        label_calls: Arc<std::sync::Mutex<usize>>
    }

    fn region(start: u64, end: u64) -> Range {
        Range::new("chr1", start, end).unwrap()
    }

    /// One child sample with a single read covering the first 30 bases
    fn build(
        mode: ProcessingMode, candidates: Vec<Candidate>, image_creator: FakeImageCreator,
        labels: Vec<([i32; 2], bool)>, realign: bool
    ) -> (RegionProcessor, Harness) {
        let reads = vec![
            test_read("r1", "chr1", 0, &REFERENCE[..30]),
            test_read("r2", "chr1", 32, &REFERENCE[32..40])
        ];
        let child = Sample::new(SampleRole::Child, "child", Box::new(FakeReadSource::new(reads)), vec![0], 100);
        let caller = FakeCaller::new(candidates);
        let labeler = FakeLabeler::new(labels);
        let harness = Harness {
            caller_calls: caller.calls.clone(),
            image_calls: image_creator.calls.clone(),
            label_calls: labeler.calls.clone()
        };

        let config = ProcessorConfigBuilder::default()
            .mode(mode)
            .build()
            .unwrap();
        let reference = Arc::new(InMemoryReference::new(&[("chr1", REFERENCE)]));
        let mut processor = RegionProcessor::new(config, vec![child], reference, Box::new(caller), Box::new(image_creator))
            .unwrap()
            .with_labeler(Box::new(labeler));
        if realign {
            processor = processor.with_realigner(Box::new(FakeRealigner::default()));
        }
        (processor, harness)
    }

    #[test]
    fn test_labels_follow_candidate_order() {
        let candidates = vec![
            test_candidate("chr1", 5, "C", &["G"]),
            test_candidate("chr1", 9, "C", &["T"])
        ];
        let (mut processor, harness) = build(
            ProcessingMode::Training, candidates.clone(), FakeImageCreator::new(11),
            vec![([0, 1], true), ([1, 1], true)], false
        );
        let output = processor.process(&region(0, 20)).unwrap();

        assert_eq!(output.candidates[&SampleRole::Child], candidates);
        let examples = &output.examples[&SampleRole::Child];
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].variant().start(), 5);
        assert_eq!(examples[0].variant().call().genotype(), [0, 1]);
        assert_eq!(examples[0].label(), Some(1));
        assert_eq!(examples[1].variant().start(), 9);
        assert_eq!(examples[1].variant().call().genotype(), [1, 1]);
        assert_eq!(examples[1].label(), Some(2));
        assert_eq!(*harness.label_calls.lock().unwrap(), 1);

        assert_eq!(output.metrics.n_candidate_variant_sites, 2);
        assert_eq!(output.metrics.n_confident_candidates, 2);
        assert_eq!(output.metrics.n_feature_records, 2);
    }

    #[test]
    fn test_one_to_many_records() {
        let candidates = vec![
            test_candidate("chr1", 5, "C", &["G"]),
            test_candidate("chr1", 9, "C", &["T", "A"]),
            test_candidate("chr1", 13, "C", &["G"])
        ];
        let image_creator = FakeImageCreator::new(11)
            .with_script(9, Some(vec![vec!["T"], vec!["A"], vec!["T", "A"]]))
            .with_script(13, None);
        let (mut processor, _harness) = build(
            ProcessingMode::Training, candidates, image_creator,
            vec![([0, 1], true), ([1, 2], true), ([1, 1], true)], false
        );
        let output = processor.process(&region(0, 20)).unwrap();

        let examples = &output.examples[&SampleRole::Child];
        assert_eq!(examples.len(), 4);
        assert_eq!(examples[0].variant().start(), 5);
        assert_eq!(examples[0].variant().call().genotype(), [0, 1]);
        for (record, expected) in examples[1..].iter().zip([1, 1, 2]) {
            assert_eq!(record.variant().start(), 9);
            assert_eq!(record.variant().call().genotype(), [1, 2]);
            assert_eq!(record.label(), Some(expected));
        }
        assert_eq!(examples[1].alt_alleles_considered(), &["T".to_string()]);
        assert_eq!(examples[2].alt_alleles_considered(), &["A".to_string()]);
        assert_eq!(examples[3].encoded_payload(), &[9, 2]);
        // the third candidate had no image but is still a candidate
        assert_eq!(output.candidates[&SampleRole::Child].len(), 3);
    }

    #[test]
    fn test_non_confident_candidates_have_no_records() {
        let candidates = vec![
            test_candidate("chr1", 5, "C", &["G"]),
            test_candidate("chr1", 9, "C", &["T"])
        ];
        let (mut processor, harness) = build(
            ProcessingMode::Training, candidates, FakeImageCreator::new(11),
            vec![([0, 1], false), ([1, 1], true)], false
        );
        let output = processor.process(&region(0, 20)).unwrap();

        let examples = &output.examples[&SampleRole::Child];
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].variant().start(), 9);
        assert_eq!(output.candidates[&SampleRole::Child].len(), 2);
        assert_eq!(output.metrics.n_non_confident_candidates, 1);
        assert_eq!(output.metrics.n_confident_candidates, 1);
        // the image creator is never asked for the skipped candidate
        let image_calls = harness.image_calls.lock().unwrap();
        assert_eq!(image_calls.len(), 1);
        assert_eq!(image_calls[0].0, 9);
    }

    #[test]
    fn test_calling_mode_never_labels() {
        let candidates = vec![test_candidate("chr1", 5, "C", &["G"])];
        let (processor, harness) = build(
            ProcessingMode::Calling, candidates, FakeImageCreator::new(11), vec![([1, 1], false)], false
        );
        let mut processor = processor.with_gvcf_emitter(Box::new(FakeGvcfEmitter));
        let output = processor.process(&region(0, 20)).unwrap();

        assert_eq!(*harness.label_calls.lock().unwrap(), 0);
        let examples = &output.examples[&SampleRole::Child];
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label(), None);
        assert_eq!(examples[0].variant().call().genotype(), [-1, -1]);

        let gvcfs = &output.gvcfs[&SampleRole::Child];
        assert_eq!(gvcfs.len(), 1);
        assert_eq!(gvcfs[0].range(), region(0, 20));
    }

    #[test]
    fn test_training_requires_labeler() {
        let child = Sample::new(SampleRole::Child, "child", Box::new(FakeReadSource::new(vec![])), vec![0], 100);
        let config = ProcessorConfigBuilder::default()
            .mode(ProcessingMode::Training)
            .build()
            .unwrap();
        let reference = Arc::new(InMemoryReference::new(&[("chr1", REFERENCE)]));
        let mut processor = RegionProcessor::new(
            config, vec![child], reference, Box::new(FakeCaller::new(vec![])), Box::new(FakeImageCreator::new(11))
        ).unwrap();
        assert!(processor.process(&region(0, 20)).is_err());
    }

    #[test]
    fn test_bad_sample_order() {
        let child = Sample::new(SampleRole::Child, "child", Box::new(FakeReadSource::new(vec![])), vec![0, 1], 100);
        let reference = Arc::new(InMemoryReference::new(&[("chr1", REFERENCE)]));
        let result = RegionProcessor::new(
            ProcessorConfig::default(), vec![child], reference,
            Box::new(FakeCaller::new(vec![])), Box::new(FakeImageCreator::new(11))
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_mismatch_aborts() {
        let candidates = vec![
            test_candidate("chr1", 5, "C", &["G"]),
            // reference has C here
            test_candidate("chr1", 9, "T", &["G"]),
            test_candidate("chr1", 13, "C", &["G"])
        ];
        let (mut processor, harness) = build(
            ProcessingMode::Calling, candidates, FakeImageCreator::new(11), vec![], true
        );
        let error = processor.process(&region(0, 20)).unwrap_err();
        let mismatch = error.downcast_ref::<ReferenceMismatchError>().unwrap();
        assert_eq!(mismatch.position, 10);
        assert!(error.to_string().contains("does not match the bases in the reference"));

        // nothing after the failing candidate was encoded
        let image_calls = harness.image_calls.lock().unwrap();
        assert_eq!(image_calls.len(), 1);
        assert_eq!(image_calls[0].0, 5);
        assert!(image_calls[0].2);
    }

    #[test]
    fn test_realigned_haplotypes() {
        let candidates = vec![test_candidate("chr1", 10, "G", &["T"])];
        let (mut processor, harness) = build(
            ProcessingMode::Calling, candidates.clone(), FakeImageCreator::new(31), vec![], true
        );
        processor.process(&region(0, 20)).unwrap();
        assert!(harness.image_calls.lock().unwrap()[0].2);

        // window is clipped at the contig start
        let haplotypes = processor.align_to_all_haplotypes(&candidates[0], 0).unwrap().unwrap();
        assert_eq!(haplotypes.window_start(), 0);
        assert_eq!(haplotypes.sequence("T").unwrap(), b"ACGTACGTACTTACGTACGTACGTAC");
        assert_eq!(haplotypes.read_alignments("T").unwrap().len(), 1);
    }

    #[test]
    fn test_reads_are_replaced() {
        let (mut processor, harness) = build(
            ProcessingMode::Calling, vec![], FakeImageCreator::new(11), vec![], false
        );
        let output = processor.process(&region(0, 10)).unwrap();
        assert_eq!(output.read_counts[&SampleRole::Child], 1);
        assert_eq!(processor.samples()[0].reads()[0].name(), "r1");

        let output = processor.process(&region(33, 40)).unwrap();
        assert_eq!(output.read_counts[&SampleRole::Child], 1);
        assert_eq!(processor.samples()[0].reads().len(), 1);
        assert_eq!(processor.samples()[0].reads()[0].name(), "r2");

        let calls = harness.caller_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], (region(33, 40), 1));
    }

    #[test]
    fn test_unconfident_attach_is_an_error() {
        // the processor skips these, but a direct attach must fail loudly
        let candidate = test_candidate("chr1", 5, "C", &["G"]);
        let (processor, _harness) = build(
            ProcessingMode::Training, vec![], FakeImageCreator::new(11), vec![], false
        );
        let records = processor.create_pileup_examples(&candidate, 0).unwrap();
        assert_eq!(records.len(), 1);
        let label = crate::data_types::label::Label::new(candidate.variant().clone(), [0, 1], false);
        assert_eq!(attach_label(records[0].clone(), &label), Err(UnconfidentLabelError));
    }
}
