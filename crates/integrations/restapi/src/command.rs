use conduit_core::{
    DatasourceConfiguration, ExecuteActionDto, HttpMethod, PaginationField, PaginationType,
    PluginError, Property, ResolvedActionConfiguration,
};
use conduit_plugin::headers::layered;
use conduit_plugin::{
    BodyFormat, CommandStrategy, HttpRequestSpec, RequestBody, append_query, join_url,
};
use tracing::debug;

use crate::error::RestApiError;

const JSON: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Builds a request for an arbitrary HTTP endpoint from the action as
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestApiCommand;

impl CommandStrategy for RestApiCommand {
    fn name(&self) -> &'static str {
        "rest-api"
    }

    fn build_execute_request(
        &self,
        action: &ResolvedActionConfiguration,
        datasource: &DatasourceConfiguration,
        dto: &ExecuteActionDto,
    ) -> Result<HttpRequestSpec, PluginError> {
        let headers = layered(&datasource.headers, &action.headers);

        let url = match page_url(action, dto)? {
            Some(page) => {
                debug!(page = %page, "following pagination URL");
                join_url(datasource.url.as_deref(), Some(&page))?
            }
            None => {
                let mut url = join_url(datasource.url.as_deref(), action.path.as_deref())?;
                let params = layered(&datasource.query_parameters, &action.query_parameters);
                append_query(&mut url, &params, action.encode_params_toggle);
                url
            }
        };

        let body = build_body(
            action.http_method,
            content_type(&headers),
            action.body.as_deref(),
            &action.body_form_data,
        )?;

        let mut spec = HttpRequestSpec::new(action.http_method, url).with_body(body);
        spec.headers = headers;
        Ok(spec)
    }

    fn response_format(&self) -> BodyFormat {
        BodyFormat::ContentTypeSniffed
    }
}

/// The page URL to request instead of `path`, when the caller asked to follow
/// one. The page URL already carries its own query string.
fn page_url(
    action: &ResolvedActionConfiguration,
    dto: &ExecuteActionDto,
) -> Result<Option<String>, RestApiError> {
    if action.pagination_type != PaginationType::Url {
        return Ok(None);
    }
    let Some(field) = dto.pagination_field else {
        return Ok(None);
    };
    let url = match field {
        PaginationField::Next => action.next.as_deref(),
        PaginationField::Prev => action.prev.as_deref(),
    };
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Some(url.to_owned())),
        None => Err(RestApiError::MissingPageUrl(field)),
    }
}

/// Value of the last `Content-Type` header, without parameters.
fn content_type(headers: &[Property]) -> Option<String> {
    headers
        .iter()
        .rev()
        .find(|h| h.key.trim().eq_ignore_ascii_case("content-type"))
        .map(|h| {
            h.value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
}

/// Choose the body encoding from the content type.
///
/// `GET` and `HEAD` never carry a body.
pub fn build_body(
    method: HttpMethod,
    content_type: Option<String>,
    body: Option<&str>,
    form: &[Property],
) -> Result<RequestBody, RestApiError> {
    if !method.allows_body() {
        return Ok(RequestBody::Empty);
    }
    let text = body.filter(|b| !b.trim().is_empty());

    match content_type.as_deref() {
        Some(FORM_URLENCODED) if !form.is_empty() => Ok(RequestBody::FormUrlEncoded(form.to_vec())),
        Some(MULTIPART) => {
            if form.is_empty() && text.is_some() {
                return Err(RestApiError::InvalidBody(
                    "multipart bodies are built from form fields, not raw text".into(),
                ));
            }
            Ok(RequestBody::Multipart(form.to_vec()))
        }
        Some(ct) if ct == JSON || ct.ends_with("+json") => Ok(match text {
            None => RequestBody::Empty,
            Some(text) => serde_json::from_str(text)
                .map_or_else(|_| RequestBody::Text(text.to_owned()), RequestBody::Json),
        }),
        _ => Ok(text.map_or(RequestBody::Empty, |t| RequestBody::Text(t.to_owned()))),
    }
}
