use crate::models::ShareProvider;
use url::Url;

const DROPBOX_HOSTS: [&str; 2] = ["dropbox.com", "www.dropbox.com"];
const DROPBOX_DIRECT_HOST: &str = "dl.dropboxusercontent.com";
const GOOGLE_DRIVE_HOST: &str = "drive.google.com";

pub fn detect_provider(url: &Url) -> Option<ShareProvider> {
    let host = url.host_str()?;
    if DROPBOX_HOSTS.contains(&host) {
        Some(ShareProvider::Dropbox)
    } else if host == GOOGLE_DRIVE_HOST {
        Some(ShareProvider::GoogleDrive)
    } else {
        None
    }
}

/// Turns a cloud-storage "view" link into a direct-download URL.
///
/// Anything that is not a recognised share link comes back untouched, so
/// the result can be fed through again without changing.
pub fn rewrite_share_link(raw: &str, hint: Option<ShareProvider>) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };

    let rewritten = match hint.or_else(|| detect_provider(&url)) {
        Some(ShareProvider::Dropbox) => rewrite_dropbox(&url),
        Some(ShareProvider::GoogleDrive) => rewrite_google_drive(&url),
        None => None,
    };

    rewritten.unwrap_or_else(|| raw.to_string())
}

fn rewrite_dropbox(url: &Url) -> Option<String> {
    if !DROPBOX_HOSTS.contains(&url.host_str()?) {
        return None;
    }

    // `dl=0` is the preview switch; `rlkey` and friends must survive
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "dl")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut direct = url.clone();
    direct.set_host(Some(DROPBOX_DIRECT_HOST)).ok()?;
    if kept.is_empty() {
        direct.set_query(None);
    } else {
        direct.query_pairs_mut().clear().extend_pairs(kept);
    }
    direct.set_fragment(None);

    Some(direct.to_string())
}

fn rewrite_google_drive(url: &Url) -> Option<String> {
    if url.host_str()? != GOOGLE_DRIVE_HOST {
        return None;
    }

    // /file/d/<id>/view or ?id=<id>
    let from_path = url.path_segments().and_then(|segments| {
        let segments: Vec<&str> = segments.collect();
        segments
            .windows(2)
            .find(|pair| pair[0] == "d")
            .map(|pair| pair[1].to_string())
    });
    let id = from_path.or_else(|| {
        url.query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
    })?;

    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    Some(format!(
        "https://{}/uc?export=download&id={}",
        GOOGLE_DRIVE_HOST, id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropbox_preview_link() {
        assert_eq!(
            rewrite_share_link("https://www.dropbox.com/s/abc123/photo.png?dl=0", None),
            "https://dl.dropboxusercontent.com/s/abc123/photo.png"
        );
        assert_eq!(
            rewrite_share_link(
                "https://www.dropbox.com/scl/fi/xyz/photo.png?rlkey=k1&dl=0",
                None
            ),
            "https://dl.dropboxusercontent.com/scl/fi/xyz/photo.png?rlkey=k1"
        );
    }

    #[test]
    fn test_google_drive_links() {
        let expected = "https://drive.google.com/uc?export=download&id=1AbC_d-9";
        assert_eq!(
            rewrite_share_link(
                "https://drive.google.com/file/d/1AbC_d-9/view?usp=sharing",
                None
            ),
            expected
        );
        assert_eq!(
            rewrite_share_link("https://drive.google.com/open?id=1AbC_d-9", None),
            expected
        );
    }

    #[test]
    fn test_unknown_hosts_pass_through() {
        for raw in [
            "https://example.com/cat.png?dl=0",
            "not a url",
            "https://drive.google.com/drive/my-drive",
        ] {
            assert_eq!(rewrite_share_link(raw, None), raw);
        }
        // a wrong hint does not mangle a foreign host
        assert_eq!(
            rewrite_share_link("https://example.com/x.png", Some(ShareProvider::Dropbox)),
            "https://example.com/x.png"
        );
    }

    #[test]
    fn test_rewriting_is_idempotent() {
        for raw in [
            "https://www.dropbox.com/s/abc123/photo.png?dl=0",
            "https://dropbox.com/scl/fi/xyz/p.jpg?rlkey=k1&dl=1",
            "https://drive.google.com/file/d/1AbC/view",
            "https://drive.google.com/uc?export=download&id=1AbC",
            "https://cdn.example.org/image.webp",
        ] {
            for hint in [None, Some(ShareProvider::Dropbox), Some(ShareProvider::GoogleDrive)] {
                let once = rewrite_share_link(raw, hint);
                assert_eq!(rewrite_share_link(&once, hint), once, "{}", raw);
            }
        }
    }
}
