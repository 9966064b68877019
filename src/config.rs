use anyhow::{Context, Result};
use clap::Parser;
use std::{collections::BTreeSet, env, str::FromStr};

const MIB: u64 = 1024 * 1024;

pub const DEFAULT_VIDEO_TYPES: [&str; 5] = [
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
    "video/x-msvideo",
];

pub const DEFAULT_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

pub const DEFAULT_PRESERVED_TYPES: [&str; 3] =
    ["product.image", "product.template", "product.product"];

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub policy: MediaPolicy,
}

/// Upload and rendition policy, built once at startup and injected into
/// every component that enforces it.
#[derive(Debug, Clone)]
pub struct MediaPolicy {
    /// Prefix for retrieval URLs handed back to callers. Empty means relative.
    pub public_base_url: String,
    pub max_video_bytes: u64,
    pub max_image_bytes: u64,
    pub video_types: BTreeSet<String>,
    pub image_types: BTreeSet<String>,
    /// Record types whose images are always served untouched.
    pub preserved_types: BTreeSet<String>,
    pub jpeg_quality: u8,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            public_base_url: String::new(),
            max_video_bytes: 100 * MIB,
            max_image_bytes: 20 * MIB,
            video_types: to_set(DEFAULT_VIDEO_TYPES),
            image_types: to_set(DEFAULT_IMAGE_TYPES),
            preserved_types: to_set(DEFAULT_PRESERVED_TYPES),
            jpeg_quality: 95,
        }
    }
}

impl MediaPolicy {
    /// Largest request body the router must accept: a base64 payload of the
    /// biggest allowed file plus room for the JSON envelope.
    pub fn body_limit(&self) -> usize {
        let largest = self.max_video_bytes.max(self.max_image_bytes);
        let encoded = largest.div_ceil(3) * 4;
        usize::try_from(encoded + 64 * 1024).unwrap_or(usize::MAX)
    }

    pub fn is_preserved(&self, record_type: &str) -> bool {
        self.preserved_types.contains(record_type)
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Local media upload and serving service")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory for stored media (overrides MEDIA_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides MEDIA_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Prefix for retrieval URLs (overrides MEDIA_STORE_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Maximum video upload size in bytes (overrides MEDIA_STORE_MAX_VIDEO_BYTES)
    #[arg(long)]
    pub max_video_bytes: Option<u64>,

    /// Maximum image upload size in bytes (overrides MEDIA_STORE_MAX_IMAGE_BYTES)
    #[arg(long)]
    pub max_image_bytes: Option<u64>,

    /// Comma-separated allowed video MIME types (overrides MEDIA_STORE_VIDEO_TYPES)
    #[arg(long)]
    pub video_types: Option<String>,

    /// Comma-separated allowed image MIME types (overrides MEDIA_STORE_IMAGE_TYPES)
    #[arg(long)]
    pub image_types: Option<String>,

    /// Comma-separated record types whose images are never resized
    /// (overrides MEDIA_STORE_PRESERVED_TYPES)
    #[arg(long)]
    pub preserved_types: Option<String>,

    /// JPEG quality for resized renditions, 1-100 (overrides MEDIA_STORE_JPEG_QUALITY)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        let defaults = MediaPolicy::default();

        // --- Environment fallback ---
        let env_host = env::var("MEDIA_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("MEDIA_STORE_PORT", 3000u16)?;
        let env_storage =
            env::var("MEDIA_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("MEDIA_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/media_store.db".into());
        let env_base_url = env::var("MEDIA_STORE_PUBLIC_BASE_URL").unwrap_or_default();
        let env_max_video = env_parsed("MEDIA_STORE_MAX_VIDEO_BYTES", defaults.max_video_bytes)?;
        let env_max_image = env_parsed("MEDIA_STORE_MAX_IMAGE_BYTES", defaults.max_image_bytes)?;
        let env_quality = env_parsed("MEDIA_STORE_JPEG_QUALITY", defaults.jpeg_quality)?;

        // --- Merge ---
        let jpeg_quality = args.jpeg_quality.unwrap_or(env_quality);
        if !(1..=100).contains(&jpeg_quality) {
            anyhow::bail!("jpeg quality must be between 1 and 100, got {}", jpeg_quality);
        }

        let policy = MediaPolicy {
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            max_video_bytes: args.max_video_bytes.unwrap_or(env_max_video),
            max_image_bytes: args.max_image_bytes.unwrap_or(env_max_image),
            video_types: list_setting(args.video_types, "MEDIA_STORE_VIDEO_TYPES")
                .unwrap_or(defaults.video_types),
            image_types: list_setting(args.image_types, "MEDIA_STORE_IMAGE_TYPES")
                .unwrap_or(defaults.image_types),
            preserved_types: list_setting(args.preserved_types, "MEDIA_STORE_PRESERVED_TYPES")
                .unwrap_or(defaults.preserved_types),
            jpeg_quality,
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            policy,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an env var, falling back to `default` when it is unset.
fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

/// CLI value first, then env var. `None` means "use the default".
fn list_setting(cli: Option<String>, key: &str) -> Option<BTreeSet<String>> {
    cli.or_else(|| env::var(key).ok())
        .map(|raw| parse_list(&raw))
        .filter(|set| !set.is_empty())
}

fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn to_set<const N: usize>(items: [&str; N]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
