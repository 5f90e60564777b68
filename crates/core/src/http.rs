use url::Url;

/// Joins `path` under `base`, treating `base` as a directory even when it has
/// no trailing slash (`http://host/ollama` + `api/chat` keeps `/ollama`).
pub fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}
