//! Turns cleaned chunks into statement text, either inline or on a group of blocking workers.
//!
//! Workers only receive owned chunks and shared read-only metadata, and send back text keyed
//! by chunk index, so both paths produce the same statements in the same order.

use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time::timeout;
use tracing::{debug, error};

use super::query_builder::StatementTemplate;
use crate::database::batch_operations::chunk_bounds;
use crate::database::clean::{cast_row, CleanedRow};
use crate::database::errors::BulkOperationError;
use crate::database::postgres::sql_literal::BooleanLiteral;
use crate::database::postgres::type_registry::ColumnTypes;

/// Everything a worker needs besides the rows themselves.
#[derive(Debug)]
pub struct RenderBundle {
    pub template: StatementTemplate,
    pub column_types: Arc<ColumnTypes>,
    pub booleans: BooleanLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    pub chunk: usize,
    pub rows: usize,
    pub sql: String,
}

type RenderFn = fn(&RenderBundle, usize, &[CleanedRow]) -> Result<String, BulkOperationError>;

struct RenderTask {
    chunk: usize,
    offset: usize,
    rows: Vec<CleanedRow>,
}

/// Splits owned rows into chunks of at most `chunk_size`.
pub fn split_chunks(mut rows: Vec<CleanedRow>, chunk_size: usize) -> Vec<Vec<CleanedRow>> {
    let mut chunks: Vec<Vec<CleanedRow>> = chunk_bounds(rows.len(), chunk_size)
        .into_iter()
        .rev()
        .map(|(start, _)| rows.split_off(start))
        .collect();
    chunks.reverse();
    chunks
}

/// Renders one chunk; `offset` is the position of its first row in the whole series.
pub fn render_chunk(
    bundle: &RenderBundle,
    offset: usize,
    rows: &[CleanedRow],
) -> Result<String, BulkOperationError> {
    let literal_rows = rows
        .iter()
        .enumerate()
        .map(|(i, row)| cast_row(row, &bundle.column_types, bundle.booleans, offset + i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(bundle.template.render(&literal_rows))
}

fn offsets(chunks: &[Vec<CleanedRow>]) -> Vec<usize> {
    chunks
        .iter()
        .scan(0, |offset, chunk| {
            let start = *offset;
            *offset += chunk.len();
            Some(start)
        })
        .collect()
}

pub fn render_sequential(
    bundle: &RenderBundle,
    chunks: Vec<Vec<CleanedRow>>,
) -> Result<Vec<RenderedStatement>, BulkOperationError> {
    let offsets = offsets(&chunks);

    chunks
        .iter()
        .zip(offsets)
        .enumerate()
        .map(|(chunk, (rows, offset))| {
            let sql = render_chunk(bundle, offset, rows)?;
            Ok(RenderedStatement { chunk, rows: rows.len(), sql })
        })
        .collect()
}

fn spawn_worker(
    worker: usize,
    render: RenderFn,
    bundle: Arc<RenderBundle>,
    tasks: Arc<Mutex<std_mpsc::Receiver<RenderTask>>>,
    results: mpsc::UnboundedSender<(usize, Result<RenderedStatement, BulkOperationError>)>,
) -> JoinHandle<()> {
    task::spawn_blocking(move || loop {
        let next = match tasks.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };

        // the sender is dropped once every task is queued
        let Ok(task) = next else {
            debug!("Render worker {} finished", worker);
            break;
        };

        let result = render(&bundle, task.offset, &task.rows)
            .map(|sql| RenderedStatement { chunk: task.chunk, rows: task.rows.len(), sql });

        if results.send((task.chunk, result)).is_err() {
            break;
        }
    })
}

/// Renders on `workers` blocking tasks. Every wait for a result is bounded by `render_timeout`.
///
/// A timeout or a worker that dies fails the whole call; no partial list is returned.
pub async fn render_parallel(
    bundle: Arc<RenderBundle>,
    chunks: Vec<Vec<CleanedRow>>,
    workers: usize,
    render_timeout: Duration,
) -> Result<Vec<RenderedStatement>, BulkOperationError> {
    render_parallel_with(render_chunk, bundle, chunks, workers, render_timeout).await
}

async fn render_parallel_with(
    render: RenderFn,
    bundle: Arc<RenderBundle>,
    chunks: Vec<Vec<CleanedRow>>,
    workers: usize,
    render_timeout: Duration,
) -> Result<Vec<RenderedStatement>, BulkOperationError> {
    let total = chunks.len();
    let offsets = offsets(&chunks);

    let (task_sender, task_receiver) = std_mpsc::channel::<RenderTask>();
    let task_receiver = Arc::new(Mutex::new(task_receiver));
    let (result_sender, mut result_receiver) = mpsc::unbounded_channel();

    let handles: Vec<JoinHandle<()>> = (0..workers.clamp(1, total.max(1)))
        .map(|worker| {
            spawn_worker(
                worker,
                render,
                Arc::clone(&bundle),
                Arc::clone(&task_receiver),
                result_sender.clone(),
            )
        })
        .collect();
    drop(result_sender);

    for (chunk, (rows, offset)) in chunks.into_iter().zip(offsets).enumerate() {
        task_sender
            .send(RenderTask { chunk, offset, rows })
            .map_err(|_| BulkOperationError::RenderWorker("render workers are gone".to_string()))?;
    }
    drop(task_sender);

    let mut statements: Vec<Option<RenderedStatement>> = (0..total).map(|_| None).collect();

    for _ in 0..total {
        match timeout(render_timeout, result_receiver.recv()).await {
            Ok(Some((chunk, result))) => {
                if let Some(slot) = statements.get_mut(chunk) {
                    *slot = Some(result?);
                }
            }
            Ok(None) => {
                return Err(BulkOperationError::RenderWorker(
                    "render workers exited before every chunk was rendered".to_string(),
                ));
            }
            Err(_) => {
                let chunk = statements.iter().position(Option::is_none).unwrap_or_default();
                error!("Rendering chunk {} timed out after {:?}", chunk, render_timeout);
                return Err(BulkOperationError::RenderTimeout { chunk, timeout: render_timeout });
            }
        }
    }

    for handle in handles {
        handle.await.map_err(|e| BulkOperationError::RenderWorker(e.to_string()))?;
    }

    statements.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
        BulkOperationError::RenderWorker("a chunk was never rendered".to_string())
    })
}

/// Renders every chunk, in order. One worker (or a single chunk) renders inline.
pub async fn render_statements(
    bundle: RenderBundle,
    chunks: Vec<Vec<CleanedRow>>,
    workers: usize,
    render_timeout: Duration,
) -> Result<Vec<RenderedStatement>, BulkOperationError> {
    if workers <= 1 || chunks.len() <= 1 {
        return render_sequential(&bundle, chunks);
    }

    render_parallel(Arc::new(bundle), chunks, workers, render_timeout).await
}
