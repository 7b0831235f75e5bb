use std::time::{SystemTime, UNIX_EPOCH};

use async_stream::try_stream;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::tts::voice::{self, Prosody};
use crate::tts::{Boundary, ChunkStream, SpeechRequest, SpeechSynthesizer, SynthesisChunk, TtsError};

pub const DEFAULT_ENDPOINT: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

const CHROMIUM_FULL_VERSION: &str = "130.0.2849.68";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";
const ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";
const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Seconds between 1601-01-01 and 1970-01-01.
const WIN_EPOCH_SECS: u64 = 11_644_473_600;

/// Gap the service inserts between consecutive turns, in 100ns ticks.
const TURN_GAP_TICKS: u64 = 8_750_000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Microsoft Edge "read aloud" synthesis over its websocket API.
#[derive(Debug, Clone)]
pub struct EdgeTts {
    endpoint: String,
}

impl EdgeTts {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SpeechSynthesizer for EdgeTts {
    fn stream(&self, request: &SpeechRequest) -> ChunkStream {
        synthesize(self.endpoint.clone(), request.clone()).boxed()
    }

    fn name(&self) -> &str {
        "edge"
    }
}

/// What a single websocket message means for the current turn.
#[derive(Debug, PartialEq)]
enum Frame {
    Audio(Vec<u8>),
    Metadata(Vec<SynthesisChunk>),
    TurnEnd,
    Ignore,
}

fn synthesize(
    endpoint: String,
    request: SpeechRequest,
) -> impl Stream<Item = Result<SynthesisChunk, TtsError>> {
    try_stream! {
        let prosody = Prosody::from_request(&request)?;
        let pieces = voice::prepare_text(&request.text);
        let mut compensation = 0u64;

        for piece in pieces {
            tracing::debug!("Edge TTS: sending {} bytes of text", piece.len());

            let mut ws = connect(&endpoint).await?;
            ws.send(Message::Text(speech_config_message())).await?;
            ws.send(Message::Text(ssml_message(&prosody, &piece))).await?;

            let mut audio_received = false;
            let mut last_end = compensation;

            loop {
                let message = next_message(&mut ws).await?;
                match classify(message, compensation)? {
                    Frame::Audio(data) => {
                        audio_received = true;
                        yield SynthesisChunk::Audio(data);
                    }
                    Frame::Metadata(chunks) => {
                        for chunk in chunks {
                            if let SynthesisChunk::WordBoundary(b)
                            | SynthesisChunk::SentenceBoundary(b) = &chunk
                            {
                                last_end = b.offset + b.duration;
                            }
                            yield chunk;
                        }
                    }
                    Frame::TurnEnd => break,
                    Frame::Ignore => {}
                }
            }

            if let Err(e) = ws.close(None).await {
                tracing::debug!("Edge TTS: close after turn.end failed: {}", e);
            }

            require_audio(audio_received)?;
            compensation = last_end + TURN_GAP_TICKS;
        }
    }
}

fn require_audio(received: bool) -> Result<(), TtsError> {
    if received {
        Ok(())
    } else {
        Err(TtsError::NoAudioReceived)
    }
}

async fn connect(endpoint: &str) -> Result<WsStream, TtsError> {
    let url = format!(
        "{}?TrustedClientToken={}&Sec-MS-GEC={}&Sec-MS-GEC-Version=1-{}&ConnectionId={}",
        endpoint,
        TRUSTED_CLIENT_TOKEN,
        sec_ms_gec(SystemTime::now()),
        CHROMIUM_FULL_VERSION,
        connection_id(),
    );

    let mut request = url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Origin", HeaderValue::from_static(ORIGIN));
    headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
    headers.insert("Accept-Encoding", HeaderValue::from_static("gzip, deflate, br"));
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));

    let (ws, _response) = connect_async(request).await?;
    Ok(ws)
}

async fn next_message(ws: &mut WsStream) -> Result<Message, TtsError> {
    match ws.next().await {
        Some(message) => Ok(message?),
        None => Err(TtsError::UnexpectedResponse(
            "connection closed before turn.end".to_string(),
        )),
    }
}

fn classify(message: Message, compensation: u64) -> Result<Frame, TtsError> {
    match message {
        Message::Text(text) => {
            let (head, body) = text.split_once("\r\n\r\n").ok_or_else(|| {
                TtsError::UnexpectedResponse("text message without header block".to_string())
            })?;

            match header_value(head, "Path") {
                Some("audio.metadata") => {
                    Ok(Frame::Metadata(parse_metadata(body, compensation)?))
                }
                Some("turn.end") => Ok(Frame::TurnEnd),
                Some("turn.start") | Some("response") => Ok(Frame::Ignore),
                other => Err(TtsError::UnexpectedResponse(format!(
                    "unknown path {:?}",
                    other.unwrap_or("")
                ))),
            }
        }
        Message::Binary(data) => Ok(match parse_audio_frame(&data)? {
            Some(audio) => Frame::Audio(audio),
            None => Frame::Ignore,
        }),
        Message::Close(_) => Err(TtsError::UnexpectedResponse(
            "connection closed before turn.end".to_string(),
        )),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Frame::Ignore),
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Binary frames carry a big-endian u16 header length, the headers, then audio.
fn parse_audio_frame(data: &[u8]) -> Result<Option<Vec<u8>>, TtsError> {
    if data.len() < 2 {
        return Err(TtsError::UnexpectedResponse(
            "binary message missing header length".to_string(),
        ));
    }

    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    if header_len + 2 > data.len() {
        return Err(TtsError::UnexpectedResponse(
            "header length exceeds binary message length".to_string(),
        ));
    }

    let head = std::str::from_utf8(&data[2..2 + header_len]).map_err(|_| {
        TtsError::UnexpectedResponse("binary message headers are not UTF-8".to_string())
    })?;
    let payload = &data[2 + header_len..];

    if header_value(head, "Path") != Some("audio") {
        return Err(TtsError::UnexpectedResponse(
            "binary message path is not audio".to_string(),
        ));
    }

    match header_value(head, "Content-Type") {
        Some("audio/mpeg") if payload.is_empty() => Err(TtsError::UnexpectedResponse(
            "audio message without data".to_string(),
        )),
        Some("audio/mpeg") => Ok(Some(payload.to_vec())),
        None if payload.is_empty() => Ok(None),
        None => Err(TtsError::UnexpectedResponse(
            "audio data without content type".to_string(),
        )),
        Some(other) => Err(TtsError::UnexpectedResponse(format!(
            "unexpected content type {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct MetadataMessage {
    #[serde(rename = "Metadata")]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Data", default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BoundaryData {
    #[serde(rename = "Offset")]
    offset: u64,
    #[serde(rename = "Duration")]
    duration: u64,
    text: BoundaryText,
}

#[derive(Debug, Deserialize)]
struct BoundaryText {
    #[serde(rename = "Text")]
    text: String,
}

fn parse_metadata(body: &str, compensation: u64) -> Result<Vec<SynthesisChunk>, TtsError> {
    let message: MetadataMessage = serde_json::from_str(body)
        .map_err(|e| TtsError::UnexpectedResponse(format!("bad metadata: {}", e)))?;

    let mut chunks = Vec::new();
    for entry in message.metadata {
        let boundary = match entry.kind.as_str() {
            "WordBoundary" | "SentenceBoundary" => {
                let data: BoundaryData = serde_json::from_value(entry.data).map_err(|e| {
                    TtsError::UnexpectedResponse(format!("bad boundary metadata: {}", e))
                })?;
                Boundary {
                    offset: data.offset + compensation,
                    duration: data.duration,
                    text: data.text.text,
                }
            }
            "SessionEnd" => continue,
            other => {
                return Err(TtsError::UnexpectedResponse(format!(
                    "unknown metadata type {}",
                    other
                )))
            }
        };

        chunks.push(if entry.kind == "WordBoundary" {
            SynthesisChunk::WordBoundary(boundary)
        } else {
            SynthesisChunk::SentenceBoundary(boundary)
        });
    }

    Ok(chunks)
}

/// The `Sec-MS-GEC` token: SHA-256 over the Windows file time (rounded down to
/// five minutes) followed by the client token, as upper-case hex.
pub fn sec_ms_gec(now: SystemTime) -> String {
    let unix_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut secs = unix_secs + WIN_EPOCH_SECS;
    secs -= secs % 300;
    let ticks = secs * 10_000_000;

    Sha256::digest(format!("{}{}", ticks, TRUSTED_CLIENT_TOKEN).as_bytes())
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

fn connection_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn timestamp() -> String {
    chrono::Utc::now()
        .format("%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
        .to_string()
}

fn speech_config_message() -> String {
    let config = serde_json::json!({
        "context": {
            "synthesis": {
                "audio": {
                    "metadataoptions": {
                        "sentenceBoundaryEnabled": "false",
                        "wordBoundaryEnabled": "true"
                    },
                    "outputFormat": OUTPUT_FORMAT
                }
            }
        }
    });

    format!(
        "X-Timestamp:{}\r\nContent-Type:application/json; charset=utf-8\r\nPath:speech.config\r\n\r\n{}\r\n",
        timestamp(),
        config
    )
}

fn ssml(prosody: &Prosody, escaped_text: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='{}' rate='{}' volume='+0%'>{}</prosody></voice></speak>",
        prosody.voice, prosody.pitch, prosody.rate, escaped_text
    )
}

fn ssml_message(prosody: &Prosody, escaped_text: &str) -> String {
    format!(
        "X-RequestId:{}\r\nContent-Type:application/ssml+xml\r\nX-Timestamp:{}Z\r\nPath:ssml\r\n\r\n{}",
        connection_id(),
        timestamp(),
        ssml(prosody, escaped_text)
    )
}
