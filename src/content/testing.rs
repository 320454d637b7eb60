//! 测试辅助：日志初始化、样例数据、内存版网关和下载器

use crate::content::asset::fetcher::AssetFetcher;
use crate::content::asset::path::AssetPath;
use crate::content::error::GatewayError;
use crate::content::story::{InteractiveElement, Position, Size, Story, StoryPage};
use crate::content::sync::api::ContentApi;
use crate::content::sync::types::{
    AssetVersionResp, BatchUrlsResp, ContentVersionResp, DeltaSyncReq, DeltaSyncResp,
    SignedUrlEntry,
};
use async_trait::async_trait;
use serde_json::Map;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

pub(crate) fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new(
            "info,storybook_content_sync=debug,sqlx=warn,hyper_util::client=info,reqwest=info",
        );

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

fn padded(header: &[u8]) -> Vec<u8> {
    let mut bytes = header.to_vec();
    bytes.resize(128, 0xAB);
    bytes
}

pub(crate) fn png_bytes() -> Vec<u8> {
    padded(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

pub(crate) fn webp_bytes() -> Vec<u8> {
    padded(b"RIFF\x78\x00\x00\x00WEBPVP8 ")
}

pub(crate) fn jpeg_bytes() -> Vec<u8> {
    padded(&[0xFF, 0xD8, 0xFF, 0xE0])
}

pub(crate) fn mp3_bytes() -> Vec<u8> {
    padded(b"ID3\x04\x00\x00")
}

/// 按扩展名给出一份能通过校验的内容
pub(crate) fn media_bytes_for(path: &str) -> Option<Vec<u8>> {
    let path = path.split('?').next().unwrap_or(path);
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(png_bytes()),
        "webp" => Some(webp_bytes()),
        "jpg" | "jpeg" => Some(jpeg_bytes()),
        "mp3" => Some(mp3_bytes()),
        _ => None,
    }
}

fn page(
    id: &str,
    number: i32,
    audio: Option<String>,
    elements: Vec<InteractiveElement>,
) -> StoryPage {
    StoryPage {
        id: format!("{}-p{}", id, number),
        page_number: number,
        page_type: Some("story".to_string()),
        background_image: Some(format!("assets/stories/{}/page1-bg.webp", id)),
        character_image: Some(format!("stories/{}/{}.png", id, id)),
        audio_url: audio,
        interactive_elements: elements,
        extra: Map::new(),
    }
}

/// 两页的样例故事，共引用 5 个不同资源（两页共用背景和角色图）
pub(crate) fn story(id: &str, checksum: &str) -> Story {
    let star = InteractiveElement {
        id: format!("{}-star", id),
        element_type: Some("tap".to_string()),
        image: Some(format!("stories/{}/star.png", id)),
        position: Some(Position { x: 0.5, y: 0.5 }),
        size: Some(Size {
            width: 0.1,
            height: 0.1,
        }),
        extra: Map::new(),
    };
    Story {
        id: id.to_string(),
        checksum: checksum.to_string(),
        cover_image: Some(format!("assets/stories/{}/cover.webp", id)),
        pages: vec![
            page(id, 1, Some(format!("audio/{}/page1.mp3", id)), vec![star]),
            page(id, 2, None, Vec::new()),
        ],
        extra: Map::new(),
    }
}

/// 签名 URL 的固定格式，路径原样出现在 URL 中
pub(crate) fn signed_url_for(path: &str) -> String {
    format!("https://signed.example.com/bucket/assets/{}?sig=test", path)
}

pub(crate) fn version_resp(content_version: u64, asset_version: u64) -> ContentVersionResp {
    ContentVersionResp {
        content_version,
        asset_version,
        last_updated: 1_760_000_000_000,
        checksums: HashMap::new(),
        total_count: 0,
    }
}

/// 根据服务器上的完整故事列表构造增量响应
pub(crate) fn delta_resp(
    server_version: u64,
    changed: Vec<Story>,
    all: &[(&str, &str)],
    deleted: &[&str],
) -> DeltaSyncResp {
    DeltaSyncResp {
        server_version,
        updated_count: changed.len() as u64,
        items: changed,
        deleted_ids: deleted.iter().map(|s| s.to_string()).collect(),
        checksums: all
            .iter()
            .map(|(id, sum)| (id.to_string(), sum.to_string()))
            .collect(),
        total_count: all.len() as u64,
        last_updated: 1_760_000_000_000,
    }
}

struct FakeApiState {
    version: Result<ContentVersionResp, GatewayError>,
    version_delay: Duration,
    delta: Result<DeltaSyncResp, GatewayError>,
    asset_version: Result<AssetVersionResp, GatewayError>,
    version_calls: usize,
    delta_requests: Vec<DeltaSyncReq>,
    asset_version_calls: usize,
    batch_sizes: Vec<usize>,
    failing_batch_calls: HashSet<usize>,
    rejected: HashSet<String>,
    omitted: HashSet<String>,
}

/// 内存版内容网关
pub(crate) struct FakeContentApi {
    state: Mutex<FakeApiState>,
}

impl FakeContentApi {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeApiState {
                version: Err(GatewayError::Unreachable("未配置版本响应".to_string())),
                version_delay: Duration::ZERO,
                delta: Err(GatewayError::Status {
                    status: 500,
                    body: "未配置增量响应".to_string(),
                }),
                asset_version: Err(GatewayError::Status {
                    status: 404,
                    body: "未配置资源清单".to_string(),
                }),
                version_calls: 0,
                delta_requests: Vec::new(),
                asset_version_calls: 0,
                batch_sizes: Vec::new(),
                failing_batch_calls: HashSet::new(),
                rejected: HashSet::new(),
                omitted: HashSet::new(),
            }),
        }
    }

    pub(crate) fn set_version(&self, content_version: u64, asset_version: u64) {
        self.state.lock().unwrap().version = Ok(version_resp(content_version, asset_version));
    }

    pub(crate) fn set_version_error(&self, err: GatewayError) {
        self.state.lock().unwrap().version = Err(err);
    }

    pub(crate) fn set_version_delay(&self, delay: Duration) {
        self.state.lock().unwrap().version_delay = delay;
    }

    pub(crate) fn set_delta(&self, resp: DeltaSyncResp) {
        self.state.lock().unwrap().delta = Ok(resp);
    }

    pub(crate) fn set_delta_error(&self, err: GatewayError) {
        self.state.lock().unwrap().delta = Err(err);
    }

    pub(crate) fn set_asset_version(&self, version: u64, checksums: &[(&str, &str)]) {
        self.state.lock().unwrap().asset_version = Ok(AssetVersionResp {
            version,
            asset_checksums: checksums
                .iter()
                .map(|(p, s)| (p.to_string(), s.to_string()))
                .collect(),
            total_assets: checksums.len() as u64,
        });
    }

    /// 第 `n` 次（从 1 开始）批量签名请求返回网络错误
    pub(crate) fn fail_batch_call(&self, n: usize) {
        self.state.lock().unwrap().failing_batch_calls.insert(n);
    }

    /// 服务器把该路径列入 `failed`
    pub(crate) fn reject_path(&self, path: &str) {
        self.state.lock().unwrap().rejected.insert(path.to_string());
    }

    /// 服务器对该路径既不签名也不报失败
    pub(crate) fn omit_path(&self, path: &str) {
        self.state.lock().unwrap().omitted.insert(path.to_string());
    }

    pub(crate) fn version_calls(&self) -> usize {
        self.state.lock().unwrap().version_calls
    }

    pub(crate) fn delta_calls(&self) -> usize {
        self.state.lock().unwrap().delta_requests.len()
    }

    pub(crate) fn delta_requests(&self) -> Vec<DeltaSyncReq> {
        self.state.lock().unwrap().delta_requests.clone()
    }

    pub(crate) fn asset_version_calls(&self) -> usize {
        self.state.lock().unwrap().asset_version_calls
    }

    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().batch_sizes.clone()
    }

    /// 全部网关请求次数
    pub(crate) fn total_calls(&self) -> usize {
        let s = self.state.lock().unwrap();
        s.version_calls + s.delta_requests.len() + s.asset_version_calls + s.batch_sizes.len()
    }
}

#[async_trait]
impl ContentApi for FakeContentApi {
    async fn get_version(&self) -> Result<ContentVersionResp, GatewayError> {
        let (result, delay) = {
            let mut s = self.state.lock().unwrap();
            s.version_calls += 1;
            (s.version.clone(), s.version_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn fetch_delta(&self, req: &DeltaSyncReq) -> Result<DeltaSyncResp, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.delta_requests.push(req.clone());
        s.delta.clone()
    }

    async fn batch_urls(&self, paths: &[String]) -> Result<BatchUrlsResp, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.batch_sizes.push(paths.len());
        if s.failing_batch_calls.contains(&s.batch_sizes.len()) {
            return Err(GatewayError::Unreachable("connection reset".to_string()));
        }
        let mut resp = BatchUrlsResp::default();
        for p in paths {
            if s.omitted.contains(p) {
                continue;
            }
            if s.rejected.contains(p) {
                resp.failed.push(p.clone());
                continue;
            }
            resp.urls.push(SignedUrlEntry {
                path: p.clone(),
                signed_url: signed_url_for(p),
                expires_at: 1_760_000_900_000,
            });
        }
        Ok(resp)
    }

    async fn get_asset_version(&self) -> Result<AssetVersionResp, GatewayError> {
        let mut s = self.state.lock().unwrap();
        s.asset_version_calls += 1;
        s.asset_version.clone()
    }
}

#[derive(Default)]
struct FakeFetcherState {
    bodies: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    serve_media: bool,
    delay: Duration,
    urls: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// 内存版下载器
#[derive(Default)]
pub(crate) struct FakeFetcher {
    state: Mutex<FakeFetcherState>,
}

impl FakeFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn serve(&self, url: &str, bytes: Vec<u8>) {
        let mut s = self.state.lock().unwrap();
        s.failing.remove(url);
        s.bodies.insert(url.to_string(), bytes);
    }

    /// 未显式配置的 URL 按扩展名返回合法内容
    pub(crate) fn serve_any_media(&self) {
        self.state.lock().unwrap().serve_media = true;
    }

    pub(crate) fn fail(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_string());
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.lock().unwrap().urls.len()
    }

    /// URL 中含有 `needle` 的请求次数
    pub(crate) fn calls_matching(&self, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .urls
            .iter()
            .filter(|u| u.contains(needle))
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let delay = {
            let mut s = self.state.lock().unwrap();
            s.urls.push(url.to_string());
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            s.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.state.lock().unwrap();
        s.in_flight -= 1;
        if s.failing.contains(url) {
            return Err(GatewayError::Unreachable(format!("fetch failed: {}", url)));
        }
        if let Some(bytes) = s.bodies.get(url) {
            return Ok(bytes.clone());
        }
        if s.serve_media {
            if let Some(bytes) = media_bytes_for(url) {
                return Ok(bytes);
            }
        }
        Err(GatewayError::Status {
            status: 404,
            body: "not found".to_string(),
        })
    }
}

/// 测试用的规范化路径
pub(crate) fn asset(raw: &str) -> AssetPath {
    AssetPath::from_source(raw, "assets/").unwrap()
}
