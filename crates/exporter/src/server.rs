//! HTTP listener serving the exposition text

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use swanmon_platform::SwanmonResult;
use swanmon_proto::exposition;
use swanmon_proto::logging;
use swanmon_proto::Exporter;
use tokio::net::{TcpListener, TcpStream};

/// Routes requests to the exporter
pub struct Server {
    exporter: Arc<Exporter>,
    telemetry_path: String,
}

impl Server {
    /// Create a server exposing `exporter` under `telemetry_path`
    pub fn new(exporter: Exporter, telemetry_path: impl Into<String>) -> Self {
        Self {
            exporter: Arc::new(exporter),
            telemetry_path: telemetry_path.into(),
        }
    }

    /// Accept connections until the listener fails
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Io` if accepting a connection fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> SwanmonResult<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = server.serve_connection(stream).await {
                    logging::log_connection_error(&peer.to_string(), &err.to_string());
                }
            });
        }
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&self);
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });
        http1::Builder::new().serve_connection(io, service).await
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
        }

        let path = req.uri().path();
        if path == self.telemetry_path {
            return match self.exporter.scrape_text().await {
                Ok(body) => Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, exposition::CONTENT_TYPE)
                    .body(Full::new(Bytes::from(body)))
                    .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
                Err(err) => {
                    logging::log_emit_failed(&err.to_string());
                    text(StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics\n")
                }
            };
        }
        if path == "/" {
            return Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Full::new(Bytes::from(landing_page(&self.telemetry_path))))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
        }
        text(StatusCode::NOT_FOUND, "not found\n")
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>IPsec Exporter</title></head>\n\
         <body>\n\
         <h1>IPsec Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = telemetry_path
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use swanmon_proto::collector::{Collector, Source};
    use swanmon_proto::vici::{Endpoint, ViciPoller};
    use swanmon_proto::Emitter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn start() -> std::net::SocketAddr {
        // Nothing listens on port 1, so every scrape fails fast.
        let poller = ViciPoller::new(
            Endpoint::Tcp("127.0.0.1:1".into()),
            Duration::from_millis(200),
        );
        let exporter = Exporter::new(Collector::new(Source::Vici(poller)), Emitter::default());
        let server = Arc::new(Server::new(exporter, "/metrics"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));
        addr
    }

    #[tokio::test]
    async fn test_routes() {
        let addr = start().await;

        let metrics = get(addr, "/metrics").await;
        assert!(metrics.starts_with("HTTP/1.1 200"));
        assert!(metrics.contains("ipsec_up 0"));
        assert!(metrics.contains("ipsec_exporter_scrape_failures_total 1"));

        let landing = get(addr, "/").await;
        assert!(landing.starts_with("HTTP/1.1 200"));
        assert!(landing.contains("<a href=\"/metrics\">"));

        let missing = get(addr, "/nope").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn test_landing_page() {
        assert!(landing_page("/probe").contains("href=\"/probe\""));
    }
}
