//! Kroki-backed rendering sessions.
//!
//! A [`KrokiSession`] owns an HTTP agent bound to one Kroki server. Requests
//! are blocking `ureq` calls moved onto tokio's blocking pool.
//!
//! # Timeouts
//!
//! A blocking request cannot be cancelled. When the pool drops a render
//! future on timeout, the session is discarded but its request keeps running
//! until the agent's request timeout fires. Until then the server can see
//! one extra request per timed-out session, on top of `max_sessions`. Keep
//! `render.request_timeout_secs` close to `pool.render_timeout_secs` to bound
//! the overlap.
//!
//! # Request format
//!
//! `POST {url}/{endpoint}/{format}` with the diagram source as a plain-text
//! body. Theme, background and fixed sizes travel as
//! `Kroki-Diagram-Options-*` headers; `PlantUML` sources additionally get
//! `skinparam` directives (see [`prepare_source`]).

use std::time::Duration;

use ureq::Agent;

use crate::consts::STANDARD_DPI;
use crate::diagram::DiagramSource;
use crate::error::RenderError;
use crate::options::{Background, ImageFormat, SizePolicy, Theme};
use crate::plantuml::prepare_source;
use crate::session::{RenderSession, SessionFactory, SessionId};
use crate::svg::finalize_svg;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Create an HTTP agent with the specified request timeout.
///
/// Status codes are not turned into errors so the response body of a failed
/// render (usually the engine's syntax error) can be reported.
#[must_use]
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Width and height from a PNG IHDR chunk, or `None` for non-PNG data.
#[must_use]
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || &data[..8] != PNG_SIGNATURE {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Fully prepared request, owned so it can move to a blocking thread.
#[derive(Debug)]
struct KrokiRequest {
    url: String,
    body: String,
    headers: Vec<(&'static str, String)>,
}

impl KrokiRequest {
    fn build(base_url: &str, diagram: &DiagramSource) -> Self {
        let options = &diagram.options;
        let body = if diagram.language.is_plantuml() {
            prepare_source(&diagram.source, options)
        } else {
            diagram.source.clone()
        };

        let mut headers = Vec::new();
        if options.theme != Theme::Default {
            headers.push(("Kroki-Diagram-Options-Theme", options.theme.as_str().to_owned()));
        }
        if options.background != Background::Transparent {
            headers.push((
                "Kroki-Diagram-Options-Background",
                options.background.as_engine_value().to_owned(),
            ));
        }
        if let SizePolicy::Fixed { width, height } = options.size {
            headers.push(("Kroki-Diagram-Options-Width", width.to_string()));
            headers.push(("Kroki-Diagram-Options-Height", height.to_string()));
        }

        Self {
            url: format!(
                "{base_url}/{}/{}",
                diagram.language.endpoint(),
                options.format.as_str()
            ),
            body,
            headers,
        }
    }

    /// Send the request and return the response body.
    fn send(&self, agent: &Agent) -> Result<Vec<u8>, RenderError> {
        let mut request = agent.post(&self.url).header("Content-Type", "text/plain");
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = request
            .send(self.body.as_bytes())
            .map_err(|e| RenderError::render(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();
        if status >= 400 {
            let detail = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(RenderError::render(format!("HTTP {status}: {}", detail.trim())));
        }

        body.read_to_vec()
            .map_err(|e| RenderError::render(format!("failed to read response: {e}")))
    }
}

/// Creates [`KrokiSession`]s bound to one server.
#[derive(Debug, Clone)]
pub struct KrokiSessionFactory {
    url: String,
    request_timeout: Duration,
}

impl KrokiSessionFactory {
    /// Create a factory for the given server URL.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::SessionCreate`](crate::ErrorKind::SessionCreate)
    /// if the URL is not an `http://` or `https://` URL.
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, RenderError> {
        let url = url.trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RenderError::session_create(format!(
                "kroki url must start with http:// or https://, got '{url}'"
            )));
        }
        Ok(Self {
            url: url.to_owned(),
            request_timeout,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SessionFactory for KrokiSessionFactory {
    type Session = KrokiSession;

    /// Build an agent and check that the server answers `/health`.
    async fn create(&self, id: SessionId) -> Result<KrokiSession, RenderError> {
        let agent = create_agent(self.request_timeout);
        let health_url = format!("{}/health", self.url);

        let probe = agent.clone();
        let status = tokio::task::spawn_blocking(move || {
            probe
                .get(&health_url)
                .call()
                .map(|response| response.status().as_u16())
        })
        .await
        .map_err(|e| RenderError::session_create(format!("health check task failed: {e}")))?
        .map_err(|e| {
            RenderError::session_create(format!("kroki server {} unreachable: {e}", self.url))
        })?;

        if status >= 400 {
            return Err(RenderError::session_create(format!(
                "kroki server {} is unhealthy: HTTP {status}",
                self.url
            )));
        }

        tracing::debug!(session = %id, url = %self.url, "Kroki session created");
        Ok(KrokiSession {
            id,
            url: self.url.clone(),
            agent: Some(agent),
        })
    }
}

/// A rendering session backed by a Kroki server.
#[derive(Debug)]
pub struct KrokiSession {
    id: SessionId,
    url: String,
    agent: Option<Agent>,
}

impl RenderSession for KrokiSession {
    async fn render(&mut self, diagram: &DiagramSource) -> Result<Vec<u8>, RenderError> {
        let agent = self
            .agent
            .clone()
            .ok_or_else(|| RenderError::render(format!("{} is disposed", self.id)))?;
        let request = KrokiRequest::build(&self.url, diagram);

        let data = tokio::task::spawn_blocking(move || request.send(&agent))
            .await
            .map_err(|e| RenderError::render(format!("render task failed: {e}")))??;

        match diagram.options.format {
            ImageFormat::Png => {
                if png_dimensions(&data).is_none() {
                    return Err(RenderError::render("engine returned invalid PNG data"));
                }
                Ok(data)
            }
            ImageFormat::Svg => {
                let svg = String::from_utf8(data)
                    .map_err(|_| RenderError::render("engine returned non UTF-8 SVG"))?;
                // Only PlantUML output is rendered at the requested DPI.
                let dpi = if diagram.language.is_plantuml() {
                    diagram.options.size.dpi()
                } else {
                    STANDARD_DPI
                };
                Ok(finalize_svg(&svg, dpi).into_bytes())
            }
        }
    }

    fn dispose(&mut self) {
        if self.agent.take().is_some() {
            tracing::debug!(session = %self.id, "Kroki session disposed");
        }
    }
}
