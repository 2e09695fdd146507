//! Contains code pertaining to the HTTP service: the log entry form, health and readiness checks
//! and prometheus metrics.
use crate::domain::logging::Severity;
use crate::form::{FormErrors, LogEntryForm};
use crate::manager::LogManager;
use crate::{app, metrics};

use http::header::{self, HeaderMap};
use http::Uri;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use slog::*;
use std::convert::Infallible;
use std::sync::Arc;
use std::{net::SocketAddr, result::Result};
use strum::VariantNames;
use tokio::net::TcpListener;
use url::form_urlencoded;

const PATH_HOME: &str = "/";
const PATH_INDEX: &str = "/index";
const PATH_METRICS: &str = "/metrics";
const PATH_HEALTH: &str = "/healthcheck";
const PATH_READINESS: &str = "/ready";
const PATH_FAVICON: &str = "/favicon.ico";

const MAX_FORM_SIZE: usize = 64 * 1024;
const FLASH_COOKIE: &str = "flash";
const ENTRY_CREATED: &str = "Your log entry has been created";

const INDEX_HTML: &str = include_str!(concat!(env!("PROJ_WEB_DIR"), "/index.html"));
const FAVICON: &[u8] = include_bytes!(concat!(env!("PROJ_WEB_DIR"), "/favicon.ico"));

type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

// starts an HTTP server serving the form, health, readiness and Prometheus metrics.
pub async fn start(
    log: &Logger,
    bind_addr: &str,
    handler: HttpHandler,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    done: tokio::sync::mpsc::Sender<()>,
) -> Result<(), String> {
    let http_addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("unable to parse HTTP address {}: {}", bind_addr, e))?;

    let listener = TcpListener::bind(http_addr)
        .await
        .map_err(|e| format!("unable to bind HTTP address {}: {}", bind_addr, e))?;
    let http_server =
        hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new());
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();

    info!(log, "Starting HTTP service."; "address" => &http_addr);
    info!(log, "Exposing {} log entry form.", app::NAME; "path" => PATH_HOME);
    info!(log, "Exposing Prometheus {} exporter endpoint.", app::NAME; "path" => PATH_METRICS);
    info!(log, "Exposing readiness endpoint."; "path" => PATH_READINESS);
    info!(log, "Exposing liveness endpoint."; "path" => PATH_HEALTH);

    loop {
        tokio::select! {
            conn = listener.accept() => {
                let (stream, peer_addr) = match conn {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(log, "Accept error: {}", e);
                        continue;
                    }
                };
                debug!(log, "Incoming connection accepted: {}", peer_addr);

                let stream = hyper_util::rt::TokioIo::new(stream);
                let handler = handler.clone();

                let conn = http_server.serve_connection_with_upgrades(stream, service_fn(move |req: Request<Incoming>| {
                    let handler = handler.clone();
                    async move { handler.router(req).await }
                }));

                let conn = graceful.watch(conn.into_owned());

                let log_clone = log.clone();
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        error!(log_clone, "connection error: {}", err);
                    }
                    debug!(log_clone, "connection dropped: {}", peer_addr);
                });
            },
            _ = shutdown.recv() => {
                drop(listener);
                info!(log, "Shutting down HTTP server");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!(log, "HTTP shutdown OK");
    drop(done);
    Ok(())
}

#[derive(Clone)]
pub struct HttpHandler {
    log: Logger,
    manager: Arc<LogManager>,
    display_name: Arc<str>,
}

impl HttpHandler {
    pub fn new(log: Logger, manager: Arc<LogManager>, display_name: &str) -> Self {
        HttpHandler {
            log,
            manager,
            display_name: display_name.into(),
        }
    }

    async fn router<B>(&self, req: Request<B>) -> Result<Response<ResponseBody>, http::Error>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let response = self.route(req).await?;
        metrics::add_http_request(method.as_str(), response.status().as_u16());
        Ok(response)
    }

    async fn route<B>(&self, req: Request<B>) -> Result<Response<ResponseBody>, http::Error>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(location) = https_location(req.headers(), req.uri()) {
            return Response::builder()
                .status(StatusCode::MOVED_PERMANENTLY)
                .header(header::LOCATION, location)
                .body(empty());
        }

        let (parts, body) = req.into_parts();
        match (parts.method, parts.uri.path()) {
            (Method::GET, PATH_HOME | PATH_INDEX) => self.index(&parts.headers),
            (Method::POST, PATH_HOME | PATH_INDEX) => self.submit(body).await,
            (Method::GET, PATH_HEALTH) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(full(serde_json::to_vec(&Health { status: "OK" }).unwrap_or_default())),
            (Method::GET, PATH_READINESS) => Response::builder()
                .status(if self.manager.is_initialized() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                })
                .body(empty()),
            (Method::GET, PATH_METRICS) => self.metrics(),
            (Method::GET, PATH_FAVICON) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "image/x-icon")
                .body(full(FAVICON)),
            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(empty()),
        }
    }

    fn index(&self, headers: &HeaderMap) -> Result<Response<ResponseBody>, http::Error> {
        let flash = flash_from(headers);
        let mut response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8");
        if flash.is_some() {
            response = response.header(header::SET_COOKIE, format!("{}=; Path=/; Max-Age=0", FLASH_COOKIE));
        }
        response.body(full(self.render(
            &LogEntryForm::default(),
            &FormErrors::default(),
            flash.as_deref(),
        )))
    }

    async fn submit<B>(&self, body: B) -> Result<Response<ResponseBody>, http::Error>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let bytes = match Limited::new(body, MAX_FORM_SIZE).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!(self.log, "Form submission too large"; "limit" => MAX_FORM_SIZE);
                return Response::builder()
                    .status(StatusCode::PAYLOAD_TOO_LARGE)
                    .body(empty());
            }
            Err(e) => {
                warn!(self.log, "Could not read form submission: {}", e);
                return Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(empty());
            }
        };

        let form = LogEntryForm::parse(&bytes);
        match form.validate() {
            Ok(entry) => {
                if let Err(e) = self.manager.log(entry.severity.as_ref(), &entry.message).await {
                    error!(self.log, "Could not write log entry: {}", e; "class" => e.kind(), "severity" => entry.severity.as_ref());
                }
                let flash: String = form_urlencoded::byte_serialize(ENTRY_CREATED.as_bytes()).collect();
                Response::builder()
                    .status(StatusCode::FOUND)
                    .header(header::LOCATION, PATH_HOME)
                    .header(
                        header::SET_COOKIE,
                        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", FLASH_COOKIE, flash),
                    )
                    .body(empty())
            }
            Err(errors) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(full(self.render(&form, &errors, None))),
        }
    }

    fn metrics(&self) -> Result<Response<ResponseBody>, http::Error> {
        match metrics::gather() {
            Ok(buffer) => Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
                .body(full(buffer)),
            Err(e) => {
                error!(self.log, "Could not encode metrics: {}", e);
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(empty())
            }
        }
    }

    fn render(&self, form: &LogEntryForm, errors: &FormErrors, flash: Option<&str>) -> String {
        let selected = form.log_level.parse::<Severity>().unwrap_or(Severity::Info);
        let options: Vec<String> = Severity::VARIANTS
            .iter()
            .map(|name| {
                let attr = if *name == selected.as_ref() { " selected" } else { "" };
                format!(r#"      <option value="{0}"{1}>{0}</option>"#, name, attr)
            })
            .collect();
        let field_error = |e: Option<&str>| {
            e.map(|e| format!(r#"<div class="error">{}</div>"#, escape(e)))
                .unwrap_or_default()
        };
        let flash = flash
            .map(|f| format!(r#"<div class="flash">{}</div>"#, escape(f)))
            .unwrap_or_default();
        let explorer_link = self
            .manager
            .explorer_link()
            .map(|link| {
                format!(
                    r#"<p><a href="{}" target="_blank" rel="noopener">View the entries in the Logs Explorer</a></p>"#,
                    escape(&link)
                )
            })
            .unwrap_or_default();

        INDEX_HTML
            .replace("{{ .DisplayName }}", &escape(&self.display_name))
            .replace("{{ .AppVersion }}", &escape(app::VERSION))
            .replace("{{ .Flash }}", &flash)
            .replace("{{ .Options }}", &options.join("\n"))
            .replace("{{ .LevelError }}", &field_error(errors.log_level))
            .replace("{{ .MsgError }}", &field_error(errors.log_msg))
            .replace("{{ .LogMsg }}", &escape(&form.log_msg))
            .replace("{{ .ExplorerLink }}", &explorer_link)
    }
}

fn empty() -> ResponseBody {
    UnsyncBoxBody::new(Empty::<Bytes>::new())
}

fn full<T: Into<Bytes>>(content: T) -> ResponseBody {
    UnsyncBoxBody::new(Full::new(content.into()))
}

/// Where to send a request that a TLS terminating proxy received over plain HTTP.
fn https_location(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let proto = headers.get("x-forwarded-proto")?.to_str().ok()?;
    if proto != "http" {
        return None;
    }
    let host = match headers.get(header::HOST) {
        Some(host) => host.to_str().ok()?,
        None => uri.authority()?.as_str(),
    };
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or(PATH_HOME);
    Some(format!("https://{}{}", host, path))
}

fn flash_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| pair.starts_with("flash="))
        .find_map(|pair| form_urlencoded::parse(pair.as_bytes()).next())
        .map(|(_, message)| message.into_owned())
        .filter(|message| !message.is_empty())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogConfig, LogMode};
    use crate::domain::fakes::{FakeSink, Remote, Write};
    use pretty_assertions::assert_eq;

    async fn handler(remote: &Remote, initialize: bool) -> HttpHandler {
        let log = Logger::root(slog::Discard, o!());
        let mut manager = LogManager::new(log.clone(), Box::new(remote.clone()), Arc::new(FakeSink::default()));
        if initialize {
            manager
                .initialize(&LogConfig {
                    credentials_path: Some(String::new()),
                    app_log_id: Some("demo".to_string()),
                    logger_name: Some("demo-log".to_string()),
                    log_mode: Some(LogMode::Direct),
                })
                .await;
        }
        HttpHandler::new(log, Arc::new(manager), "Log <Demo>")
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    async fn body_text(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthcheck() {
        let handler = handler(&Remote::default(), false).await;
        let response = handler.router(request(Method::GET, "/healthcheck", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"status":"OK"}"#);
    }

    #[tokio::test]
    async fn readiness_follows_initialization() {
        let remote = Remote::default();
        let response = handler(&remote, false)
            .await
            .router(request(Method::GET, "/ready", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = handler(&remote, true)
            .await
            .router(request(Method::GET, "/ready", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn plain_http_behind_proxy_is_redirected() {
        let handler = handler(&Remote::default(), false).await;
        let req = Request::builder()
            .uri("/index?x=1")
            .header("X-Forwarded-Proto", "http")
            .header(header::HOST, "demo.example.com")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handler.router(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://demo.example.com/index?x=1"
        );

        let req = Request::builder()
            .uri("/healthcheck")
            .header("X-Forwarded-Proto", "https")
            .header(header::HOST, "demo.example.com")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(handler.router(req).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_page() {
        let handler = handler(&Remote::default(), true).await;
        let response = handler.router(request(Method::GET, "/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let page = body_text(response).await;
        assert!(page.contains("<title>Log &lt;Demo&gt;</title>"));
        assert!(page.contains(r#"<option value="INFO" selected>INFO</option>"#));
        assert!(page.contains(r#"<option value="WARNING">WARNING</option>"#));
        assert!(page.contains(r#"<option value="ERROR">ERROR</option>"#));
        assert!(page.contains("projects%2Fdemo-project%2Flogs%2Fdemo-log"));
        assert!(!page.contains("{{"));
    }

    #[tokio::test]
    async fn no_explorer_link_before_initialization() {
        let handler = handler(&Remote::default(), false).await;
        let page = body_text(handler.router(request(Method::GET, "/index", "")).await.unwrap()).await;
        assert!(!page.contains("Logs Explorer"));
    }

    #[tokio::test]
    async fn valid_submission_writes_and_redirects() {
        let remote = Remote::default();
        let handler = handler(&remote, true).await;

        let response = handler
            .router(request(Method::POST, "/", "log_level=ERROR&log_msg=disk+full"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("flash=Your+log+entry+has+been+created;"));
        assert_eq!(
            *remote.writes.lock().unwrap(),
            vec![Write::Text("disk full".to_string(), "ERROR".to_string())]
        );
    }

    #[tokio::test]
    async fn submission_is_flashed_even_when_not_initialized() {
        let remote = Remote::default();
        let handler = handler(&remote, false).await;

        let response = handler
            .router(request(Method::POST, "/index", "log_level=INFO&log_msg=hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(remote.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_submission_rerenders_the_form() {
        let remote = Remote::default();
        let handler = handler(&remote, true).await;

        let response = handler
            .router(request(Method::POST, "/", "log_level=WARNING&log_msg=+"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("This field is required."));
        assert!(page.contains(r#"<option value="WARNING" selected>WARNING</option>"#));
        assert!(remote.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerendered_message_is_escaped() {
        let handler = handler(&Remote::default(), true).await;
        let response = handler
            .router(request(Method::POST, "/", "log_level=LOUD&log_msg=%22%3E%3Cscript%3E"))
            .await
            .unwrap();
        let page = body_text(response).await;
        assert!(page.contains("Not a valid choice."));
        assert!(page.contains(r#"value="&quot;&gt;&lt;script&gt;""#));
        assert!(!page.contains("<script>"));
    }

    #[tokio::test]
    async fn oversized_submission_is_rejected() {
        let remote = Remote::default();
        let handler = handler(&remote, true).await;
        let body = format!("log_level=INFO&log_msg={}", "a".repeat(MAX_FORM_SIZE));
        let req = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let response = handler.router(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(remote.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flash_is_shown_once() {
        let handler = handler(&Remote::default(), true).await;
        let req = Request::builder()
            .uri("/")
            .header(header::COOKIE, "theme=dark; flash=Your+log+entry+has+been+created")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = handler.router(req).await.unwrap();

        assert_eq!(
            response.headers()[header::SET_COOKIE],
            "flash=; Path=/; Max-Age=0"
        );
        let page = body_text(response).await;
        assert!(page.contains(r#"<div class="flash">Your log entry has been created</div>"#));
    }

    #[tokio::test]
    async fn favicon_metrics_and_unknown_paths() {
        let handler = handler(&Remote::default(), false).await;

        let response = handler.router(request(Method::GET, "/favicon.ico", "")).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/x-icon");
        assert_eq!(body_text_len(response).await, FAVICON.len());

        handler.router(request(Method::GET, "/healthcheck", "")).await.unwrap();
        let response = handler.router(request(Method::GET, "/metrics", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("gld_http_requests_total"));

        let response = handler.router(request(Method::GET, "/nope", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = handler.router(request(Method::DELETE, "/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    async fn body_text_len(response: Response<ResponseBody>) -> usize {
        response.into_body().collect().await.unwrap().to_bytes().len()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
