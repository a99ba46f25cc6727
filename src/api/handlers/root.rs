#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = String, content_type = "text/plain")
    ),
    tag = "tradelog"
)]
pub async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
