//! Conversion pipeline: load, combine, assemble, slice, serialize.

use crate::{
    AnimationData, Assembler, Error, KeyframeLayer, QuadDocument, Rect, ResourcePool,
    SpineDocument, combine,
};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::mpsc;

#[derive(Clone, Debug)]
pub struct ConvertOptions {
    /// Multiplies every quad coordinate at load time. Must be >= 1.
    pub scale_factor: f32,
    /// Repeat looping animations up to the longest bone track of their skeleton.
    pub looping: bool,
    pub pretty_print: bool,
    /// Written to `skeleton.images`.
    pub images_path: String,
    /// Maximum concurrent pool instances per content fingerprint.
    pub pool_ceiling: usize,
    /// Use the perspective quad transform for matrix-mix timelines.
    pub perspective_mix: bool,
    /// Worker threads; `None` lets rayon decide.
    pub threads: Option<usize>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            looping: false,
            pretty_print: false,
            images_path: "./images/".to_string(),
            pool_ceiling: ResourcePool::DEFAULT_CEILING,
            perspective_mix: false,
            threads: None,
        }
    }
}

/// Receives coarse progress updates. Purely observational.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, percent: u8);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _message: &str, _percent: u8) {}
}

pub type SliceError = Box<dyn std::error::Error + Send + Sync>;

/// One image the slicer has to persist under `name`.
#[derive(Clone, Debug)]
pub struct SliceRequest {
    pub name: String,
    pub tex_id: u32,
    pub skin_index: usize,
    pub copy_index: u32,
    /// Source region in (scaled) texture pixels; for fog layers the destination bounds.
    pub rect: Rect,
    pub layer: KeyframeLayer,
}

/// Extracts or renders layer images. Implementations must be idempotent per request.
pub trait ImageSlicer: Send + Sync {
    /// Number of image variants ("skins") available for a texture.
    fn skin_count(&self, _tex_id: u32) -> usize {
        1
    }

    fn slice(&self, request: &SliceRequest) -> Result<(), SliceError>;
}

/// Fire-and-forget slice dispatch with a completion barrier.
pub struct SliceQueue<'p> {
    pool: &'p rayon::ThreadPool,
    slicer: Arc<dyn ImageSlicer>,
    tx: mpsc::Sender<(String, Result<(), String>)>,
    rx: mpsc::Receiver<(String, Result<(), String>)>,
    pending: usize,
}

impl<'p> SliceQueue<'p> {
    pub fn new(pool: &'p rayon::ThreadPool, slicer: Arc<dyn ImageSlicer>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            pool,
            slicer,
            tx,
            rx,
            pending: 0,
        }
    }

    pub fn dispatch(&mut self, request: SliceRequest) {
        let slicer = Arc::clone(&self.slicer);
        let tx = self.tx.clone();
        self.pending += 1;
        self.pool.spawn(move || {
            let result = slicer.slice(&request).map_err(|e| e.to_string());
            // The receiver is gone only when the conversion already failed.
            let _ = tx.send((request.name, result));
        });
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Waits for every dispatched request. Returns the number of slices written, or the first
    /// failure once all requests have finished.
    pub fn finish(self) -> Result<usize, Error> {
        let SliceQueue {
            tx, rx, pending, ..
        } = self;
        drop(tx);

        let mut first_failure = None;
        for _ in 0..pending {
            let (name, result) = rx.recv().map_err(|_| Error::SliceFailure {
                name: String::new(),
                message: "slice worker exited without reporting".to_string(),
            })?;
            if let Err(message) = result {
                tracing::error!(%name, %message, "slice failed");
                first_failure.get_or_insert(Error::SliceFailure { name, message });
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(pending),
        }
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, Error> {
    if threads == Some(0) {
        return Err(Error::InvalidValue {
            message: "threads must be >= 1 when set".to_string(),
        });
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder.build().map_err(|e| Error::InvalidValue {
        message: format!("failed to build rayon thread pool: {e}"),
    })
}

/// Converts a linked quad document into a Spine document.
///
/// Skeletons are combined in parallel and assembled in order; slice requests run on the same
/// worker pool and are awaited before returning.
#[tracing::instrument(skip_all, fields(skeletons = doc.skeletons.len()))]
pub fn convert(
    doc: &QuadDocument,
    options: &ConvertOptions,
    slicer: Arc<dyn ImageSlicer>,
    progress: &dyn ProgressSink,
) -> Result<SpineDocument, Error> {
    let workers = build_thread_pool(options.threads)?;

    progress.report("combining skeleton timelines", 10);
    let combined: Vec<AnimationData> = workers.install(|| {
        (0..doc.skeletons.len())
            .into_par_iter()
            .map(|i| combine(doc, i, options.looping))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut queue = SliceQueue::new(&workers, Arc::clone(&slicer));
    let mut assembler = Assembler::new(doc, options, slicer.as_ref());
    let total = combined.len().max(1);
    for (i, data) in combined.iter().enumerate() {
        assembler.assemble_skeleton(data)?;
        for request in assembler.take_slice_requests() {
            queue.dispatch(request);
        }
        let name = doc
            .skeleton(data.skeleton)
            .map(|s| s.name.as_str())
            .unwrap_or_default();
        let percent = 20 + (60 * (i + 1) / total) as u8;
        progress.report(&format!("assembled skeleton '{name}'"), percent);
    }
    let document = assembler.finish();

    progress.report(&format!("waiting for {} image slices", queue.pending()), 85);
    let sliced = queue.finish()?;
    tracing::info!(
        slots = document.slots.len(),
        skins = document.skins.len(),
        animations = document.animations.len(),
        sliced,
        "conversion finished"
    );
    progress.report("conversion finished", 100);
    Ok(document)
}

/// Loads `input` with the configured scale, converts it and serializes the result.
pub fn convert_json(
    input: &[u8],
    options: &ConvertOptions,
    slicer: Arc<dyn ImageSlicer>,
    progress: &dyn ProgressSink,
) -> Result<String, Error> {
    progress.report("loading quad document", 0);
    let doc = QuadDocument::from_json_slice_with_scale(input, options.scale_factor)?;
    let document = convert(&doc, options, slicer, progress)?;
    document.to_json_string(options.pretty_print)
}
