// src/portal/session.rs

use reqwest::Client;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument};
use url::Url;

use super::form::{FormMethod, FormPlan};
use super::table::parse_result_table;
use super::{Currency, PageSession, RawRow, SessionFactory};
use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::fiscal::TradeType;

/// Drives the portal's query form over plain HTTP.
///
/// Every session owns its own client and cookie jar, so two sessions never
/// share portal state.
pub struct HttpPageSession {
    client: Client,
    page_url: Url,
    result_timeout: Duration,
    settle: Duration,
}

impl HttpPageSession {
    pub fn new(trade_type: TradeType, config: &Config) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.as_str())
            .timeout(config.result_timeout())
            .build()?;
        let page_url = Url::parse(trade_type.portal_url())
            .map_err(|e| ScrapeError::Navigation(format!("bad portal url: {}", e)))?;
        Ok(Self {
            client,
            page_url,
            result_timeout: config.result_timeout(),
            settle: config.page_settle(),
        })
    }

    async fn load_form(&self) -> Result<String> {
        debug!(url = %self.page_url, "loading query form");
        let url = self.page_url.clone();
        let body = timeout(self.result_timeout, async {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| transport_error(&format!("GET {}", url), e))?;
            let resp = resp
                .error_for_status()
                .map_err(|e| ScrapeError::Navigation(e.to_string()))?;
            resp.text()
                .await
                .map_err(|e| transport_error("reading query form", e))
        })
        .await
        .map_err(|_| {
            ScrapeError::Timeout(format!(
                "query form {} did not load within {:?}",
                self.page_url, self.result_timeout
            ))
        })??;
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
        Ok(body)
    }

    async fn submit(&self, plan: &FormPlan, fields: &[(String, String)]) -> Result<String> {
        let request = match plan.method {
            FormMethod::Post => self.client.post(plan.action.clone()).form(fields),
            FormMethod::Get => self.client.get(plan.action.clone()).query(fields),
        };
        let body = timeout(self.result_timeout, async {
            let resp = request
                .send()
                .await
                .map_err(|e| transport_error("submitting query", e))?;
            let resp = resp
                .error_for_status()
                .map_err(|e| ScrapeError::Navigation(e.to_string()))?;
            resp.text()
                .await
                .map_err(|e| transport_error("reading result page", e))
        })
        .await??;
        Ok(body)
    }
}

/// Client-side timeouts count as the page never arriving.
fn transport_error(what: &str, e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout(format!("{}: {}", what, e))
    } else {
        ScrapeError::Navigation(format!("{}: {}", what, e))
    }
}

impl PageSession for HttpPageSession {
    #[instrument(level = "debug", skip(self))]
    async fn submit_query(
        &self,
        year: i32,
        hs_code: &str,
        currency: Currency,
    ) -> Result<Vec<RawRow>> {
        let page = self.load_form().await?;
        let plan = FormPlan::from_html(&page, &self.page_url, currency)?;
        let fields = plan.fill(year, hs_code)?;

        let body = self.submit(&plan, &fields).await?;
        parse_result_table(&body)?.ok_or_else(|| {
            ScrapeError::Timeout(format!(
                "no result table for HS {} year {} within {:?}",
                hs_code, year, self.result_timeout
            ))
        })
    }
}

/// Opens one fresh [`HttpPageSession`] per HS-code scrape.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    config: Config,
}

impl HttpSessionFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpPageSession;

    fn open(&self, trade_type: TradeType) -> Result<HttpPageSession> {
        HttpPageSession::new(trade_type, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    #[derive(Clone)]
    enum Reply {
        Page(u16, String),
        /// Accept the request and never answer.
        Stall,
    }

    /// Local stand-in for the portal. Routes match on the request line prefix,
    /// e.g. `"POST /eidb/icomcntq_all.asp"`.
    struct LocalPortal {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl LocalPortal {
        async fn start(routes: Vec<(&'static str, Reply)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let routes = Arc::new(routes);

            let log = requests.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let log = log.clone();
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut stream).await;
                        let line = request.lines().next().unwrap_or_default().to_string();
                        log.lock().unwrap().push(request);
                        let reply = routes
                            .iter()
                            .find(|(prefix, _)| line.starts_with(prefix))
                            .map(|(_, r)| r.clone())
                            .unwrap_or(Reply::Page(404, "not found".into()));
                        match reply {
                            Reply::Stall => sleep(Duration::from_secs(60)).await,
                            Reply::Page(status, body) => {
                                let resp = format!(
                                    "HTTP/1.1 {} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                    status,
                                    body.len(),
                                    body
                                );
                                let _ = stream.write_all(resp.as_bytes()).await;
                                let _ = stream.shutdown().await;
                            }
                        }
                    });
                }
            });
            LocalPortal { addr, requests }
        }

        fn url(&self, path: &str) -> Url {
            Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
        }

        fn request_lines(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.lines().next().unwrap_or_default().to_string())
                .collect()
        }

        fn last_request(&self) -> String {
            self.requests.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn query_page(method: &str, action: &str) -> String {
        format!(
            r#"<html><body><div><div>header</div><div>
<form name="form1" method="{}" action="{}">
  <table>
    <tr><td><select id="select2" name="yy1">
        <option value="2021">2021-2022</option>
        <option value="2020" selected>2020-2021</option>
    </select></td></tr>
    <tr><td><input type="text" name="hscode" value=""></td></tr>
  </table>
  <input type="radio" id="radiousd" name="radioDAll" value="1">
  <input type="radio" id="radiorupee" name="radioDAll" value="2" checked>
  <input type="submit" id="button1" name="button1" value="Submit">
</form>
</div></div></body></html>"#,
            method, action
        )
    }

    const RESULT_PAGE: &str = r#"<html><body><div><div>banner</div><div><div>
<table><tr><td>Commodity: 0101 LIVE HORSES</td></tr></table>
<table>
<tr><th>S.No.</th><th>Country</th><th>2020-2021</th><th>2021-2022</th></tr>
<tr><td>1.</td><td>NEPAL</td><td>0.50</td><td>1,234.56</td></tr>
<tr><td colspan="2">Total</td><td>0.50</td><td>1,234.56</td></tr>
</table>
</div></div></div></body></html>"#;

    fn session_for(portal: &LocalPortal, wait: Duration) -> HttpPageSession {
        let mut session = HttpPageSession::new(TradeType::Import, &Config::default()).unwrap();
        session.page_url = portal.url("/eidb/icomcntq.asp");
        session.result_timeout = wait;
        session
    }

    #[test]
    fn sessions_target_the_trade_type_endpoint() {
        let config = Config::default();
        let import = HttpPageSession::new(TradeType::Import, &config).unwrap();
        let export = HttpPageSession::new(TradeType::Export, &config).unwrap();
        assert_eq!(import.page_url.as_str(), super::super::IMPORT_URL);
        assert_eq!(export.page_url.as_str(), super::super::EXPORT_URL);
        assert_eq!(import.result_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn posts_filled_form_and_reads_rows() {
        let portal = LocalPortal::start(vec![
            ("GET /eidb/icomcntq.asp", Reply::Page(200, query_page("post", "icomcntq_all.asp"))),
            ("POST /eidb/icomcntq_all.asp", Reply::Page(200, RESULT_PAGE.to_string())),
        ])
        .await;
        let session = session_for(&portal, Duration::from_secs(5));

        let rows = session.submit_query(2021, "0101", Currency::Usd).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cell(1), Some("NEPAL"));
        assert_eq!(rows[0].cell(3), Some("1,234.56"));

        let body = portal.last_request();
        assert!(body.contains("yy1=2021"));
        assert!(body.contains("hscode=0101"));
        assert!(body.contains("radioDAll=1"));
        assert!(!body.contains("radioDAll=2"));

        // every query starts from a fresh page load
        session.submit_query(2020, "0101", Currency::Usd).await.unwrap();
        let lines = portal.request_lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("GET /eidb/icomcntq.asp"));
        assert!(lines[1].starts_with("POST /eidb/icomcntq_all.asp"));
        assert!(lines[2].starts_with("GET /eidb/icomcntq.asp"));
        assert!(lines[3].starts_with("POST /eidb/icomcntq_all.asp"));
    }

    #[tokio::test]
    async fn get_forms_send_fields_in_the_query_string() {
        let portal = LocalPortal::start(vec![
            ("GET /eidb/icomcntq.asp", Reply::Page(200, query_page("get", "result.asp"))),
            ("GET /eidb/result.asp", Reply::Page(200, RESULT_PAGE.to_string())),
        ])
        .await;
        let session = session_for(&portal, Duration::from_secs(5));

        let rows = session.submit_query(2020, "0102", Currency::Usd).await.unwrap();
        assert_eq!(rows.len(), 1);
        let lines = portal.request_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("GET /eidb/result.asp?"));
        assert!(lines[1].contains("yy1=2020"));
        assert!(lines[1].contains("hscode=0102"));
    }

    #[tokio::test]
    async fn missing_result_table_is_a_timeout() {
        let portal = LocalPortal::start(vec![
            ("GET /eidb/icomcntq.asp", Reply::Page(200, query_page("post", "icomcntq_all.asp"))),
            ("POST /eidb/icomcntq_all.asp", Reply::Page(200, "<html><body>No data</body></html>".into())),
        ])
        .await;
        let session = session_for(&portal, Duration::from_secs(5));

        let err = session.submit_query(2021, "0101", Currency::Usd).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Timeout(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn server_error_on_page_load_is_a_navigation_error() {
        let portal = LocalPortal::start(vec![(
            "GET /eidb/icomcntq.asp",
            Reply::Page(500, "down for maintenance".into()),
        )])
        .await;
        let session = session_for(&portal, Duration::from_secs(5));

        let err = session.submit_query(2021, "0101", Currency::Usd).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Navigation(_)), "{:?}", err);
        assert_eq!(portal.request_lines().len(), 1);
    }

    #[tokio::test]
    async fn stalled_page_load_times_out() {
        let portal = LocalPortal::start(vec![("GET /eidb/icomcntq.asp", Reply::Stall)]).await;
        let session = session_for(&portal, Duration::from_millis(200));

        let result = timeout(
            Duration::from_secs(5),
            session.submit_query(2021, "0101", Currency::Usd),
        )
        .await
        .expect("page load must be bounded by the result timeout");
        assert!(matches!(result, Err(ScrapeError::Timeout(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn stalled_result_page_times_out() {
        let portal = LocalPortal::start(vec![
            ("GET /eidb/icomcntq.asp", Reply::Page(200, query_page("post", "icomcntq_all.asp"))),
            ("POST /eidb/icomcntq_all.asp", Reply::Stall),
        ])
        .await;
        let session = session_for(&portal, Duration::from_millis(200));

        let result = timeout(
            Duration::from_secs(5),
            session.submit_query(2021, "0101", Currency::Usd),
        )
        .await
        .expect("result wait must be bounded");
        assert!(matches!(result, Err(ScrapeError::Timeout(_))), "{:?}", result);
    }
}
