//! HTML5 `<video>` snippets for embedding stored media in a page.

use crate::models::options::VideoOptions;

const CONTAINER_STYLE: &str = "width: 100%; height: 100%; display: block; overflow: hidden; \
                               position: relative; box-sizing: border-box;";
const VIDEO_STYLE: &str = "width: 100%; height: 100%; max-width: 100%; max-height: 100%; \
                           object-fit: fill; background: #000; display: block; \
                           position: relative; box-sizing: border-box;";

/// Snippet honouring every playback toggle in `options`.
///
/// Autoplay always comes with `muted` and `playsinline`, since browsers block
/// unmuted autoplay.
pub fn video_embed(url: &str, mime_type: &str, options: &VideoOptions) -> String {
    let mut attrs = Vec::new();
    let mut data_attrs = Vec::new();

    if options.hide_controls {
        data_attrs.push(r#"data-video-hide-controls="true""#);
    } else {
        attrs.push("controls");
    }

    if options.autoplay {
        attrs.extend(["autoplay", "muted", "playsinline"]);
        data_attrs.push(r#"data-video-autoplay="true""#);
    }

    if options.loop_playback {
        attrs.push("loop");
        data_attrs.push(r#"data-video-loop="true""#);
    }

    if options.hide_fullscreen {
        attrs.extend([
            r#"controlsList="nodownload nofullscreen""#,
            "disablePictureInPicture",
        ]);
        data_attrs.push(r#"data-video-hide-fullscreen="true""#);
    }

    render(url, mime_type, &attrs, &data_attrs)
}

/// Editor preview: always shows controls and ignores the stored toggles.
pub fn video_embed_preview(url: &str, mime_type: &str) -> String {
    render(url, mime_type, &["controls"], &[])
}

fn render(url: &str, mime_type: &str, attrs: &[&str], data_attrs: &[&str]) -> String {
    let mut container_attrs = String::from(r#" data-is-local-video="true""#);
    for data in data_attrs {
        container_attrs.push(' ');
        container_attrs.push_str(data);
    }

    let mut video_attrs = String::new();
    for attr in attrs {
        video_attrs.push(' ');
        video_attrs.push_str(attr);
    }

    format!(
        concat!(
            r#"<div class="o_custom_video_container"{} style="{}">"#,
            r#"<video{} style="{}" preload="metadata">"#,
            r#"<source src="{}" type="{}">"#,
            "Your browser does not support the video tag.",
            "</video></div>"
        ),
        container_attrs,
        CONTAINER_STYLE,
        video_attrs,
        VIDEO_STYLE,
        html_escape(url),
        html_escape(mime_type),
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
