//! Fixture helpers shared by the crate's unit tests.

use httpmock::prelude::*;
use httpmock::Mock;

/// Apache-style directory index linking to `hrefs`.
pub fn listing(hrefs: &[&str]) -> String {
    let rows: String = hrefs
        .iter()
        .map(|href| format!("<a href=\"{href}\">{href}</a><br>\n"))
        .collect();
    format!(
        "<html><head><title>Index</title></head><body><pre>\
         <a href=\"?C=N;O=D\">Name</a>\n{rows}</pre></body></html>"
    )
}

/// Serve a listing page at `path`.
pub fn serve_dir<'a>(server: &'a MockServer, path: &str, hrefs: &[&str]) -> Mock<'a> {
    let body = listing(hrefs);
    server.mock(|when, then| {
        when.method(GET).path(path.to_string());
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(body);
    })
}

/// Serve a data file at `path` with an optional ETag on HEAD.
pub fn serve_file<'a>(
    server: &'a MockServer,
    path: &str,
    body: &str,
    etag: Option<&str>,
) -> (Mock<'a>, Mock<'a>) {
    let get = server.mock(|when, then| {
        when.method(GET).path(path.to_string());
        then.status(200)
            .header("content-type", "text/plain")
            .body(body.to_string());
    });
    let head = server.mock(|when, then| {
        when.method(httpmock::Method::HEAD).path(path.to_string());
        match etag {
            Some(tag) => then.status(200).header("etag", tag.to_string()),
            None => then.status(405),
        };
    });
    (get, head)
}
