//! `mdfig render` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use futures_util::future::join_all;
use mdfig_config::{CliSettings, Config};
use mdfig_render::{
    CancelHandle, DiagramResult, DiagramSource, DocumentRender, DocumentSummary,
    KrokiSessionFactory, RenderCache, RenderOrchestrator, SessionPool, extract_diagrams,
};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Markdown files to render diagrams from.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to configuration file (default: auto-discover mdfig.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to write images to (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Kroki server URL (overrides config).
    #[arg(long, env = "MDFIG_KROKI_URL")]
    kroki_url: Option<String>,

    /// Output format: svg or png (overrides config).
    #[arg(long)]
    format: Option<String>,

    /// Diagram theme: default, dark, forest or neutral (overrides config).
    #[arg(long)]
    theme: Option<String>,

    /// Rendering DPI (overrides config).
    #[arg(long)]
    dpi: Option<u32>,

    /// Maximum concurrent rendering sessions (overrides config).
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-diagram render timeout in seconds (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable verbose output (progress and timing logs).
    #[arg(short, long)]
    pub verbose: bool,
}

/// Diagrams extracted from one input file.
struct Document {
    path: PathBuf,
    diagrams: Vec<DiagramSource>,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, an input can't be read, no
    /// rendering session can be started, or any diagram fails to render.
    pub(crate) async fn execute(self, output: &Output) -> Result<(), CliError> {
        let cli_settings = CliSettings {
            kroki_url: self.kroki_url,
            dpi: self.dpi,
            format: self.format,
            theme: self.theme,
            max_sessions: self.jobs,
            render_timeout_secs: self.timeout,
            output_dir: self.output,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let defaults = config.render_options()?;

        let documents = self
            .files
            .into_iter()
            .map(|path| {
                let markdown =
                    std::fs::read_to_string(&path).map_err(|source| CliError::ReadInput {
                        path: path.display().to_string(),
                        source,
                    })?;
                let diagrams = extract_diagrams(&markdown, &defaults);
                Ok(Document { path, diagrams })
            })
            .collect::<Result<Vec<_>, CliError>>()?;

        output.info(&format!("Kroki URL: {}", config.render.kroki_url));
        output.info(&format!("Output directory: {}", config.output_dir.display()));
        std::fs::create_dir_all(&config.output_dir)?;

        let factory =
            KrokiSessionFactory::new(&config.render.kroki_url, config.request_timeout())?;
        let pool = SessionPool::new(factory, config.pool_config()?)?;
        let cache = Arc::new(match config.cache.capacity() {
            Some(capacity) => RenderCache::with_capacity_limit(capacity),
            None => RenderCache::new(),
        });
        let cancel = CancelHandle::new();
        let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let renders = documents.iter().map(|document| {
            let orchestrator = RenderOrchestrator::new(Arc::clone(&cache), pool.clone())
                .with_cancel(cancel.clone());
            async move {
                let name = document.path.display().to_string();
                let progress = |message: &str, percent: u8| {
                    tracing::info!(document = %name, percent, "{message}");
                };
                let result = orchestrator
                    .render_all(&name, &document.diagrams, Some(&progress))
                    .await;
                (document, result)
            }
        });
        let results = join_all(renders).await;
        interrupt.abort();

        let mut failed = 0;
        let mut outcome = Ok(());
        for (document, result) in results {
            match result {
                Ok(DocumentRender::Completed(results)) => {
                    failed += report_document(output, &config.output_dir, document, &results)?;
                }
                Ok(DocumentRender::Cancelled) => {
                    output.warning(&format!("{}: cancelled", document.path.display()));
                }
                Err(err) => {
                    if outcome.is_ok() {
                        outcome = Err(CliError::from(err));
                    }
                }
            }
        }

        let stats = cache.stats();
        output.highlight(&format!(
            "Cache: {} entries, {} hits, {} misses ({:.0}% hit rate)",
            stats.total_entries,
            stats.hits,
            stats.misses,
            stats.hit_rate * 100.0
        ));

        pool.shutdown();
        cache.dispose();

        outcome?;
        if failed > 0 {
            return Err(CliError::Failed(failed));
        }
        Ok(())
    }
}

async fn cancel_on_interrupt(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupted, cancelling render");
        cancel.cancel();
    }
}

/// Write a document's images and print its summary. Returns the number of
/// failed diagrams.
fn report_document(
    output: &Output,
    output_dir: &Path,
    document: &Document,
    results: &[DiagramResult],
) -> Result<usize, CliError> {
    let summary = DocumentSummary::from_results(results);
    let line = format!(
        "{}: {} diagram(s), {} rendered, {} cached, {} failed",
        document.path.display(),
        results.len(),
        summary.rendered,
        summary.cached,
        summary.failed
    );
    output.outcome(&line, summary.failed);

    for (diagram, result) in document.diagrams.iter().zip(results) {
        match result {
            Ok(rendered) => {
                let path = output_dir.join(image_filename(diagram));
                std::fs::write(&path, &rendered.bytes)?;
                output.detail(&format!("diagram {} -> {}", diagram.index, path.display()));
            }
            Err(err) => output.detail(&format!("diagram {}: {err}", diagram.index)),
        }
    }

    Ok(summary.failed)
}

/// Content-addressed image filename, stable across runs.
fn image_filename(diagram: &DiagramSource) -> String {
    format!(
        "diagram_{}.{}",
        diagram.fingerprint().short(),
        diagram.options.format.as_str()
    )
}

#[cfg(test)]
mod tests {
    use mdfig_render::{DiagramLanguage, ImageFormat, RenderError, RenderOptions, Rendered};
    use pretty_assertions::assert_eq;

    use super::*;

    fn diagram(index: usize, source: &str, format: ImageFormat) -> DiagramSource {
        DiagramSource::new(index, DiagramLanguage::Mermaid, source)
            .with_options(RenderOptions::default().with_format(format))
    }

    #[test]
    fn test_image_filename_is_content_addressed() {
        let a = diagram(0, "graph TD;A-->B", ImageFormat::Svg);
        let b = diagram(5, "graph TD;A-->B", ImageFormat::Svg);
        let png = diagram(0, "graph TD;A-->B", ImageFormat::Png);

        let name = image_filename(&a);
        assert!(name.starts_with("diagram_"));
        assert!(name.ends_with(".svg"));
        assert_eq!(name.len(), "diagram_".len() + 12 + ".svg".len());
        assert_eq!(name, image_filename(&b));
        assert!(image_filename(&png).ends_with(".png"));
    }

    #[test]
    fn test_report_document_writes_successful_images() {
        let dir = tempfile::tempdir().unwrap();
        let document = Document {
            path: PathBuf::from("guide.md"),
            diagrams: vec![
                diagram(0, "graph TD;A-->B", ImageFormat::Svg),
                diagram(1, "not a diagram", ImageFormat::Svg),
            ],
        };
        let results = vec![
            Ok(Rendered {
                bytes: Arc::from(&b"<svg/>"[..]),
                format: ImageFormat::Svg,
                from_cache: false,
            }),
            Err(RenderError::render("HTTP 400: syntax error")),
        ];

        let failed = report_document(&Output::new(), dir.path(), &document, &results).unwrap();

        assert_eq!(failed, 1);
        let written = dir.path().join(image_filename(&document.diagrams[0]));
        assert_eq!(std::fs::read(written).unwrap(), b"<svg/>");
        assert!(!dir.path().join(image_filename(&document.diagrams[1])).exists());
    }
}
