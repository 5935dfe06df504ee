//! Blocking HTTP client for the Suno generation API.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{
    GenerateParams, GenerationClient, JobKind, Model, TaskStatus, UnavailableClient,
};
use crate::config::ForgeConfig;
use crate::error::{ForgeError, Result};

/// The backend insists on a callback URL even though results are polled.
const CALLBACK_PLACEHOLDER: &str = "https://example.com/callback";
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    custom_mode: bool,
    instrumental: bool,
    model: Model,
    call_back_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    upload_url: Option<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    style: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    title: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    negative_tags: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    vocal_gender: &'a str,
    style_weight: f64,
    weirdness_constraint: f64,
    audio_weight: f64,
}

impl<'a> GenerateBody<'a> {
    fn new(params: &'a GenerateParams, upload_url: Option<&'a str>) -> Self {
        Self {
            custom_mode: params.custom_mode,
            instrumental: params.instrumental,
            model: params.model,
            call_back_url: CALLBACK_PLACEHOLDER,
            upload_url,
            prompt: &params.prompt,
            style: &params.style,
            title: &params.title,
            negative_tags: &params.negative_tags,
            vocal_gender: &params.vocal_gender,
            style_weight: params.style_weight,
            weirdness_constraint: params.weirdness_constraint,
            audio_weight: params.audio_weight,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Envelope {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<Value>,
}

pub struct SunoClient {
    http: Client,
    base_url: String,
    api_key: RwLock<String>,
}

impl SunoClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: RwLock::new(api_key.trim().to_string()),
        })
    }

    fn api_key(&self) -> String {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let key = self.api_key();
        if key.is_empty() {
            return Err(ForgeError::Precondition("No API key".into()));
        }
        Ok(builder.bearer_auth(key))
    }

    fn send(&self, builder: RequestBuilder) -> Result<Envelope> {
        let response = check_status(builder.send()?)?;
        let body = response.text()?;
        serde_json::from_str(&body)
            .map_err(|e| ForgeError::Transport(format!("Unexpected response: {e}")))
    }

    fn get(&self, path: &str) -> Result<Envelope> {
        let builder = self.authorized(self.http.get(self.url(path)))?;
        self.send(builder)
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Envelope> {
        let builder = self.authorized(self.http.post(self.url(path)).json(body))?;
        self.send(builder)
    }
}

/// The backend client for `config`, or a stand-in that reports why it is missing.
pub fn client_from_config(config: &ForgeConfig) -> Arc<dyn GenerationClient> {
    let key = config.api_key.as_deref().unwrap_or_default();
    match SunoClient::new(&config.base_url, key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("could not create HTTP client: {e}");
            Arc::new(UnavailableClient::new(e.to_string()))
        }
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(ForgeError::Transport(
        format!("HTTP {} {}", status.as_u16(), snippet).trim_end().to_string(),
    ))
}

fn data_str<'a>(envelope: &'a Envelope, pointer: &str) -> Option<&'a str> {
    envelope
        .data
        .as_ref()?
        .pointer(pointer)?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Pull the task identifier out of a submit response.
fn task_id(envelope: &Envelope) -> Result<String> {
    match data_str(envelope, "/taskId") {
        Some(id) => Ok(id.to_string()),
        None => Err(ForgeError::Transport(
            envelope
                .msg
                .clone()
                .filter(|m| !m.is_empty() && envelope.code != Some(200))
                .unwrap_or_else(|| "No taskId in response".to_string()),
        )),
    }
}

fn parse_record_info(envelope: &Envelope) -> TaskStatus {
    let urls = envelope
        .data
        .as_ref()
        .and_then(|data| data.pointer("/response/sunoData"))
        .and_then(Value::as_array)
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|t| t.get("audioUrl").and_then(Value::as_str))
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    TaskStatus {
        status: data_str(envelope, "/status").unwrap_or_default().to_string(),
        error_message: data_str(envelope, "/errorMessage")
            .unwrap_or_default()
            .to_string(),
        result_urls: urls,
    }
}

impl GenerationClient for SunoClient {
    fn set_credential(&self, credential: &str) {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) =
            credential.trim().to_string();
    }

    fn has_credential(&self) -> bool {
        !self.api_key().is_empty()
    }

    fn check_connectivity(&self) -> Result<()> {
        let envelope = self
            .get("/api/v1/generate/credit")
            .map_err(|e| ForgeError::Connectivity(e.to_string()))?;
        if envelope.code == Some(200) || envelope.data.is_some() {
            Ok(())
        } else {
            Err(ForgeError::Connectivity(envelope.msg.unwrap_or_default()))
        }
    }

    fn submit(
        &self,
        kind: JobKind,
        params: &GenerateParams,
        source_url: Option<&str>,
    ) -> Result<String> {
        let path = match kind {
            JobKind::Generate | JobKind::ConnectivityTest => "/api/v1/generate",
            JobKind::UploadCover => "/api/v1/generate/upload-cover",
            JobKind::AddVocals => "/api/v1/generate/add-vocals",
        };
        if kind.needs_source() && source_url.is_none() {
            return Err(ForgeError::Precondition("No uploaded source audio".into()));
        }
        let body = GenerateBody::new(params, source_url);
        log::debug!("submitting {:?} with model {}", kind, params.model.as_str());
        task_id(&self.post(path, &body)?)
    }

    fn poll(&self, task_id: &str) -> Result<TaskStatus> {
        let path = format!("/api/v1/generate/record-info?taskId={task_id}");
        Ok(parse_record_info(&self.get(&path)?))
    }

    fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String> {
        let name = if file_name.is_empty() {
            "audio.wav"
        } else {
            file_name
        };
        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("file", part);
        let builder = self.authorized(
            self.http
                .post(self.url("/api/file-stream-upload"))
                .multipart(form),
        )?;
        let envelope = self.send(builder)?;
        data_str(&envelope, "/fileUrl")
            .or_else(|| data_str(&envelope, "/downloadUrl"))
            .map(str::to_string)
            .ok_or_else(|| ForgeError::Transport("No fileUrl in upload response".into()))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = check_status(self.http.get(url).send()?)?;
        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(ForgeError::Transport(format!("Empty download from {url}")));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> Envelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_generate_body_skips_empty_fields() {
        let params = GenerateParams {
            prompt: "lofi \"beats\"".into(),
            ..GenerateParams::default()
        };
        let value = serde_json::to_value(GenerateBody::new(&params, None)).unwrap();
        assert_eq!(value["prompt"], "lofi \"beats\"");
        assert_eq!(value["model"], "V4_5ALL");
        assert_eq!(value["customMode"], false);
        assert_eq!(value["callBackUrl"], CALLBACK_PLACEHOLDER);
        assert!(value.get("style").is_none());
        assert!(value.get("uploadUrl").is_none());
    }

    #[test]
    fn test_cover_body_carries_upload_url() {
        let params = GenerateParams::default();
        let value =
            serde_json::to_value(GenerateBody::new(&params, Some("https://files/x.wav"))).unwrap();
        assert_eq!(value["uploadUrl"], "https://files/x.wav");
        assert_eq!(value["styleWeight"], 0.65);
    }

    #[test]
    fn test_task_id_extraction() {
        let ok = envelope(r#"{"code":200,"msg":"success","data":{"taskId":"abc123"}}"#);
        assert_eq!(task_id(&ok).unwrap(), "abc123");

        let rejected = envelope(r#"{"code":429,"msg":"insufficient credits","data":null}"#);
        assert_eq!(
            task_id(&rejected).unwrap_err().to_string(),
            "insufficient credits"
        );

        let empty = envelope(r#"{"code":200,"data":{"taskId":""}}"#);
        assert_eq!(task_id(&empty).unwrap_err().to_string(), "No taskId in response");
    }

    #[test]
    fn test_record_info_parsing() {
        let body = envelope(
            r#"{"code":200,"data":{"taskId":"t","status":"SUCCESS","errorMessage":null,
                "response":{"sunoData":[{"audioUrl":"https://a/1.mp3"},{"audioUrl":""},{"audioUrl":"https://a/2.mp3"}]}}}"#,
        );
        let status = parse_record_info(&body);
        assert_eq!(status.status, "SUCCESS");
        assert_eq!(status.error_message, "");
        assert_eq!(status.result_urls, vec!["https://a/1.mp3", "https://a/2.mp3"]);
    }

    #[test]
    fn test_record_info_without_response() {
        let body = envelope(
            r#"{"code":200,"data":{"status":"GENERATE_AUDIO_FAILED","errorMessage":"model overloaded"}}"#,
        );
        let status = parse_record_info(&body);
        assert_eq!(status.failure_message(), "model overloaded");
        assert!(status.result_urls.is_empty());
    }

    #[test]
    fn test_requests_without_key_fail_locally() {
        let client = SunoClient::new("http://127.0.0.1:9", "").unwrap();
        assert!(!client.has_credential());
        let err = client.poll("abc").unwrap_err();
        assert_eq!(err.to_string(), "No API key");

        client.set_credential("  sk-test \n");
        assert!(client.has_credential());
        assert_eq!(client.api_key(), "sk-test");
    }

    #[test]
    fn test_url_joining() {
        let client = SunoClient::new("https://api.example.com/", "k").unwrap();
        assert_eq!(
            client.url("/api/v1/generate"),
            "https://api.example.com/api/v1/generate"
        );
    }
}
