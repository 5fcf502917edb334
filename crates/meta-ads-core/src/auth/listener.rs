use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use url::Url;

use super::oauth::REDIRECT_PATH;
use super::{AuthError, OAuthClient};

/// How long we wait for the provider to redirect back before giving up.
pub const AUTH_FLOW_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const SUCCESS_HTML: &str = r#"<html><body style="font-family: system-ui; padding: 40px; text-align: center;"><h1>Authentication successful</h1><p>You may close this window and return to the terminal.</p></body></html>"#;
const ERROR_HTML: &str = r#"<html><body style="font-family: system-ui; padding: 40px; text-align: center;"><h1>Authentication failed</h1><p>Please return to the terminal for details.</p></body></html>"#;

/// Stand up the loopback listener, send the operator through the provider's
/// consent page, and resolve to the captured authorization code.
///
/// The redirect capture races the deadline; whichever fires first wins and the
/// listener is torn down on every exit path, releasing the bound port.
pub async fn run_loopback_flow<F>(
    client: &OAuthClient,
    open_browser: bool,
    notify_authorization_url: F,
    timeout: Duration,
) -> Result<String, AuthError>
where
    F: Fn(&Url) -> Result<(), AuthError>,
{
    let port = client.redirect().port;
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            return Err(AuthError::PortInUse(port));
        }
        Err(err) => return Err(err.into()),
    };

    let auth_url = client.authorization_url();
    notify_authorization_url(&auth_url)?;

    // Best-effort only: the operator can always follow the printed URL.
    if open_browser {
        if let Err(err) = open::that(auth_url.as_str()) {
            eprintln!("Could not open a browser automatically ({err}); use the URL above.");
        }
    }

    let (tx, rx) = oneshot::channel();
    let accept = tokio::spawn(async move {
        let result = accept_authorization(listener).await;
        let _ = tx.send(result);
    });

    tokio::select! {
        received = rx => received.map_err(|_| AuthError::ListenerClosed)?,
        _ = tokio::time::sleep(timeout) => {
            accept.abort();
            // Wait for the task to wind down so the port is free on return.
            let _ = accept.await;
            Err(AuthError::TimedOut(timeout.as_secs()))
        }
    }
}

/// Serve connections until the redirect path is hit, then settle exactly once.
/// Stray traffic must not end the attempt: browsers probe other paths (favicon
/// and friends) and open speculative preconnects that close without sending a
/// byte. Those connections are dropped and the wait continues; only failures
/// of the listener itself abort.
async fn accept_authorization(listener: TcpListener) -> Result<String, AuthError> {
    loop {
        let (mut stream, _addr) = listener.accept().await?;

        let url = match read_request_url(&mut stream).await {
            Ok(url) => url,
            Err(_) => continue,
        };

        if url.path() != REDIRECT_PATH {
            let _ = respond(&mut stream, 404, "").await;
            continue;
        }

        let mut code: Option<String> = None;
        let mut error: Option<String> = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        // The outcome is settled by the query parameters; a browser that hangs
        // up before reading its confirmation page does not change it.
        if let Some(err) = error {
            let _ = respond(&mut stream, 400, ERROR_HTML).await;
            return Err(AuthError::AccessDenied(err));
        }

        let Some(code) = code else {
            let _ = respond(&mut stream, 400, ERROR_HTML).await;
            return Err(AuthError::MissingAuthorizationCode);
        };

        let _ = respond(&mut stream, 200, SUCCESS_HTML).await;
        let _ = stream.shutdown().await;
        return Ok(code);
    }
}

async fn read_request_url(stream: &mut TcpStream) -> Result<Url, AuthError> {
    let mut buffer = [0u8; 4096];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    let path = parse_request_path(&request)?;
    Ok(Url::parse(&format!("http://localhost{path}"))?)
}

fn parse_request_path(request: &str) -> Result<&str, AuthError> {
    let mut lines = request.lines();
    let first_line = lines
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing request line".into()))?;
    let mut parts = first_line.split_whitespace();
    let _method = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing method".into()))?;
    let path = parts
        .next()
        .ok_or_else(|| AuthError::InvalidAuthorizationResponse("missing path".into()))?;
    Ok(path)
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> Result<(), AuthError> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let response = format!(
        "{status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OAuthConfig, RedirectTarget};

    fn test_client(port: u16) -> OAuthClient {
        OAuthClient::new(OAuthConfig::new("123", "s3cret"))
            .unwrap()
            .with_redirect(RedirectTarget { port })
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn send_redirect(url: &Url, path_and_query: String) {
        let port = test_port(url);
        tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let request = format!(
                "GET {path_and_query} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
        });
    }

    fn test_port(auth_url: &Url) -> u16 {
        let redirect = auth_url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .expect("redirect_uri present");
        Url::parse(&redirect).unwrap().port().unwrap()
    }

    #[tokio::test]
    async fn captures_authorization_code() {
        let client = test_client(free_port());
        let code = run_loopback_flow(
            &client,
            false,
            |url| {
                send_redirect(url, "/oauth/callback?code=test-code".into());
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await
        .expect("flow resolves to code");
        assert_eq!(code, "test-code");
    }

    #[tokio::test]
    async fn error_parameter_resolves_to_access_denied_and_releases_port() {
        let port = free_port();
        let client = test_client(port);
        let err = run_loopback_flow(
            &client,
            false,
            |url| {
                send_redirect(url, "/oauth/callback?error=access_denied".into());
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::AccessDenied(reason) if reason == "access_denied"));
        // The attempt is over, so the port must rebind immediately.
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn redirect_without_code_or_error_is_missing_code() {
        let client = test_client(free_port());
        let err = run_loopback_flow(
            &client,
            false,
            |url| {
                send_redirect(url, "/oauth/callback".into());
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MissingAuthorizationCode));
    }

    #[tokio::test]
    async fn unrelated_paths_get_404_and_the_wait_continues() {
        let client = test_client(free_port());
        let code = run_loopback_flow(
            &client,
            false,
            |url| {
                let port = test_port(url);
                tokio::spawn(async move {
                    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    stream
                        .write_all(b"GET /favicon.ico HTTP/1.1\r\nConnection: close\r\n\r\n")
                        .await
                        .unwrap();
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;

                    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    stream
                        .write_all(
                            b"GET /oauth/callback?code=after-favicon HTTP/1.1\r\nConnection: close\r\n\r\n",
                        )
                        .await
                        .unwrap();
                    let _ = stream.read(&mut buf).await;
                });
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await
        .expect("flow survives unrelated requests");
        assert_eq!(code, "after-favicon");
    }

    #[tokio::test]
    async fn empty_connection_does_not_end_the_attempt() {
        let client = test_client(free_port());
        let code = run_loopback_flow(
            &client,
            false,
            |url| {
                let port = test_port(url);
                tokio::spawn(async move {
                    // A speculative preconnect: open, send nothing, hang up.
                    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    drop(stream);
                    tokio::time::sleep(Duration::from_millis(100)).await;

                    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    stream
                        .write_all(
                            b"GET /oauth/callback?code=real-code HTTP/1.1\r\nConnection: close\r\n\r\n",
                        )
                        .await
                        .unwrap();
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                });
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await
        .expect("attempt survives an empty connection");
        assert_eq!(code, "real-code");
    }

    #[tokio::test]
    async fn deadline_elapsing_times_out_and_releases_port() {
        let port = free_port();
        let client = test_client(port);
        let err = run_loopback_flow(&client, false, |_| Ok(()), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TimedOut(_)));
        assert!(err.to_string().contains("try `meta-ads auth` again"));
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn occupied_port_fails_fast_with_port_in_use() {
        let holder = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let client = test_client(port);
        let err = run_loopback_flow(&client, false, |_| Ok(()), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PortInUse(p) if p == port));
    }
}
