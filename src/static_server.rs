use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::core::errors::ApiError;
use crate::core::reply::Reply;

#[derive(RustEmbed)]
#[folder = "static"]
pub struct Assets;

pub fn serve_static(path: &str) -> Result<Reply, ApiError> {
    let file_path = match path {
        "/" | "/index.html" => "index.html",
        _ => path.trim_start_matches("/static/").trim_start_matches('/'),
    };

    // Templates are rendered, never served raw.
    if file_path.starts_with("templates/") {
        return Err(ApiError::not_found("File"));
    }

    let file = Assets::get(file_path).ok_or_else(|| ApiError::not_found("File"))?;
    let mime = from_path(file_path).first_or_octet_stream();

    Ok(Reply::Asset {
        content_type: mime.as_ref().to_string(),
        body: file.data.to_vec(),
    })
}
