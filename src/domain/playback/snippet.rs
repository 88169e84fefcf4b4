//! Browser embed for survey pages.
//!
//! The script fetches the published mapping once, derives keys from clicked element text with the
//! same steps as [`crate::domain::canonical::rendered_key`], and plays the mapped clip.

use crate::domain::canonical::KEY_EXCLUDED_PATTERN;

/// Survey page classes that receive a speaker icon.
pub const TARGET_CLASSES: [&str; 5] = [
    "text-element",
    "question-title",
    "closed-vertical-choice",
    "row-header-text",
    "battery-grid",
];

const SPEAKER_ICON_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/thumb/2/21/Speaker_Icon.svg/480px-Speaker_Icon.svg.png";

const TEMPLATE: &str = r#"<style>
  .tts-loader {
    width: 16px;
    margin-left: 10px;
    aspect-ratio: 1;
    display: inline-block;
    vertical-align: middle;
    --c: no-repeat linear-gradient(#000 0 0);
    background: var(--c) 0% 50%, var(--c) 50% 50%, var(--c) 100% 50%;
    background-size: 20% 100%;
    animation: tts-loader 1s infinite linear;
  }
  @keyframes tts-loader {
    0%   { background-size: 20% 100%, 20% 100%, 20% 100% }
    33%  { background-size: 20% 10%,  20% 100%, 20% 100% }
    50%  { background-size: 20% 100%, 20% 10%,  20% 100% }
    66%  { background-size: 20% 100%, 20% 100%, 20% 10%  }
    100% { background-size: 20% 100%, 20% 100%, 20% 100% }
  }
</style>
<script>
document.addEventListener("DOMContentLoaded", async function () {
  const MAPPING_URL = __MAPPING_URL__;
  const KEY_EXCLUDED = new RegExp(__KEY_PATTERN__, "gu");
  const TARGET_CLASSES = __TARGET_CLASSES__;
  const SPEAKER_ICON_URL = __ICON_URL__;

  let mapping = null;
  try {
    const response = await fetch(MAPPING_URL);
    if (!response.ok) throw new Error("HTTP " + response.status);
    mapping = await response.json();
  } catch (error) {
    console.error("Failed to load TTS mapping, audio disabled:", error);
  }

  function canonicalKey(text) {
    return text.normalize("NFC").toLowerCase().replace(KEY_EXCLUDED, "").normalize("NFC");
  }

  function start(icon) {
    icon.style.display = "none";
    const loader = document.createElement("div");
    loader.className = "tts-loader";
    icon.parentNode.insertBefore(loader, icon.nextSibling);
    icon._ttsLoader = loader;
  }

  function stop(icon) {
    if (icon._ttsLoader) {
      icon._ttsLoader.remove();
      icon._ttsLoader = null;
    }
    icon.style.display = "inline-block";
  }

  function play(text, icon) {
    if (!mapping || icon._ttsLoader) return;
    const key = canonicalKey(text);
    if (!key) return;
    const url = Object.prototype.hasOwnProperty.call(mapping, key) ? mapping[key] : null;
    if (typeof url !== "string") {
      console.warn("No TTS audio found for key:", key, "text:", text);
      return;
    }
    const audio = new Audio(url);
    start(icon);
    audio.addEventListener("ended", () => stop(icon));
    audio.addEventListener("error", () => stop(icon));
    const started = audio.play();
    if (started && started.catch) started.catch(() => stop(icon));
  }

  function speakerIcon(elem, marginLeft) {
    const icon = document.createElement("img");
    icon.src = SPEAKER_ICON_URL;
    icon.alt = "Speaker";
    icon.style.cssText =
      "width:24px;height:24px;cursor:pointer;display:inline-block;vertical-align:middle;margin-left:" + marginLeft;
    icon.addEventListener("click", function (e) {
      e.preventDefault();
      const text = elem.innerText;
      if (text) play(text, icon);
    });
    return icon;
  }

  function wrap(elem, tag) {
    const wrapper = document.createElement(tag);
    wrapper.style.display = "inline-flex";
    wrapper.style.alignItems = "center";
    elem.parentNode.insertBefore(wrapper, elem);
    wrapper.appendChild(elem);
    return wrapper;
  }

  const container = document.querySelector("div.questions");
  if (!container) {
    console.error("Questions container not found.");
    return;
  }

  TARGET_CLASSES.forEach(function (cls) {
    Array.from(container.getElementsByClassName(cls)).forEach(function (elem) {
      if (elem.classList.contains("audio-icon-added")) return;
      if (elem.closest(".battery-grid") && (elem.querySelector("input") || elem.querySelector("label"))) return;

      if (cls === "closed-vertical-choice") {
        if (elem.tagName.toLowerCase() === "label") {
          elem.style.display = "inline-flex";
          elem.style.alignItems = "center";
          elem.appendChild(speakerIcon(elem, "4px"));
          elem.insertAdjacentHTML("afterend", "<br>");
        } else {
          const wrapper = wrap(elem, "span");
          wrapper.appendChild(speakerIcon(elem, "4px"));
          wrapper.insertAdjacentHTML("afterend", "<br>");
        }
      } else if (!elem.closest("td")) {
        wrap(elem, "div").appendChild(speakerIcon(elem, "8px"));
      } else {
        elem.insertAdjacentElement("beforeend", speakerIcon(elem, "4px"));
      }
      elem.classList.add("audio-icon-added");
    });
  });
});
</script>
"#;

/// Render the embed for a published mapping URL.
pub fn render(mapping_url: &str) -> String {
    TEMPLATE
        .replace("__MAPPING_URL__", &js_literal(mapping_url))
        .replace("__KEY_PATTERN__", &js_literal(KEY_EXCLUDED_PATTERN))
        .replace("__TARGET_CLASSES__", &js_literal(&TARGET_CLASSES))
        .replace("__ICON_URL__", &js_literal(SPEAKER_ICON_URL))
}

/// JSON is valid JavaScript; `</` is escaped so a value cannot close the script element.
fn js_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}
