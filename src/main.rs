use genpipe::{
    extension_for_mime, logger, normalizer::detect_provider, Dispatcher, GenerationRequest,
    GenerationResult, ImageNormalizer, ImageSource, NormalizerConfig, QualityMode,
    RetryPolicy, ServiceConfig, SessionState, TextToImageRequest,
};
use std::env;
use std::fs;
use std::time::Duration;

const USAGE: &str = "usage: genpipe <image path | image url | share link> [prompt] [fast|standard|pro] [5|10]\n       genpipe --dalle <prompt>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match dotenv::dotenv() {
        Ok(_) => log::info!("✅ .env file loaded successfully"),
        Err(_) => log::warn!("⚠️  No .env file found, using system environment variables"),
    }

    logger::init_with_config(logger::LoggerConfig::from_env())?;

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(first) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let mut session = SessionState::default();
    let normalizer_config = NormalizerConfig::from_env();

    let outcome = if first == "--dalle" {
        let prompt = args.get(1..).unwrap_or_default().join(" ");
        let service = ServiceConfig::openai_dalle()
            .with_policy(RetryPolicy::image().with_env_overrides());
        logger::log_config_info(&normalizer_config, &service);
        session.set_credential(service.credential_from_env()?);

        let dispatcher = Dispatcher::new(service)?;
        let request = TextToImageRequest::new(prompt.clone());
        let result = dispatcher
            .dispatch_text_to_image(&request, &dispatcher.plan(), session.credential()?)
            .await;
        session
            .history
            .record(&dispatcher.service().name, &prompt, request.size.as_str(), &result);
        finish(&dispatcher, result, normalizer_config.fetch_timeout).await
    } else {
        let service = ServiceConfig::segmind_kling()
            .with_policy(RetryPolicy::video().with_env_overrides());
        logger::log_config_info(&normalizer_config, &service);
        session.set_credential(service.credential_from_env()?);

        log::info!("🖼️  Normalizing input image...");
        let normalizer = ImageNormalizer::new(normalizer_config.clone())?;
        let image = match normalizer.normalize(source_from_arg(first)?).await {
            Ok(image) => {
                let (width, height) = image.dimensions();
                log::info!("✅ Canonical image ready: {}x{}, {} bytes", width, height, image.len());
                image
            }
            Err(e) => {
                log::error!("❌ Failed to normalize image: {}", e);
                return Err(e.into());
            }
        };

        let mut request = GenerationRequest::for_service(image, &service);
        if let Some(prompt) = args.get(1) {
            request.prompt = prompt.clone();
        }
        if let Some(mode) = args.get(2) {
            request = request.with_mode(mode.parse::<QualityMode>()?);
        }
        if let Some(duration) = args.get(3) {
            request = request.with_duration(duration.parse()?);
        }

        let dispatcher = Dispatcher::new(service)?;
        let result = dispatcher
            .dispatch(&request, &dispatcher.plan(), session.credential()?)
            .await;
        session.history.record(
            &dispatcher.service().name,
            &request.prompt,
            &request.summary(),
            &result,
        );
        finish(&dispatcher, result, normalizer_config.fetch_timeout).await
    };

    for entry in session.history.entries() {
        log::info!(
            "📜 {} {} [{}] {}",
            entry.created_at.format("%H:%M:%S"),
            entry.service,
            if entry.success { "ok" } else { "failed" },
            entry.outcome
        );
    }

    outcome
}

fn source_from_arg(arg: &str) -> Result<ImageSource, Box<dyn std::error::Error>> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        let provider = url::Url::parse(arg).ok().and_then(|url| detect_provider(&url));
        return Ok(match provider {
            Some(provider) => ImageSource::share_link(arg, Some(provider)),
            None => ImageSource::url(arg),
        });
    }
    let bytes = fs::read(arg)?;
    Ok(ImageSource::bytes(bytes, None))
}

/// Downloads a reference if needed and saves the media under `outputs/`.
async fn finish(
    dispatcher: &Dispatcher,
    result: GenerationResult,
    download_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match result {
        GenerationResult::MediaReference { url, .. } => {
            log::info!("🔗 Service returned a reference, downloading...");
            dispatcher.resolve_reference(&url, download_timeout).await
        }
        other => other,
    };

    match result {
        GenerationResult::MediaBytes {
            bytes,
            mime,
            endpoint,
        } => {
            fs::create_dir_all("outputs")?;
            let filename = format!(
                "outputs/genpipe_output_{}.{}",
                chrono::Utc::now().timestamp(),
                extension_for_mime(&mime)
            );
            fs::write(&filename, &bytes)?;
            log::info!("💾 {} from {} saved to: {}", mime, endpoint, filename);
            Ok(())
        }
        GenerationResult::Failure(failure) => {
            log::error!("❌ Generation failed: {}", failure);
            if let Some(diagnostic) = &failure.diagnostic {
                log::debug!("Response body: {}", diagnostic);
            }
            Err(genpipe::PipelineError::from(failure).into())
        }
        GenerationResult::MediaReference { url, .. } => {
            log::warn!("⚠️  Download returned another reference: {}", url);
            Ok(())
        }
    }
}
