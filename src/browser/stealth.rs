//! Device emulation and stealth mode
//!
//! Every browsing context is made to look like an ordinary desktop Chrome or
//! mobile Safari user: matching user agent, viewport, touch support, locale,
//! timezone and request headers, plus scripts that hide the usual automation
//! markers. This is best-effort evasion, not a security boundary.

use crate::error::{Error, Result};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetTouchEmulationEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";

/// Referer sent with every request from a browsing context
pub const PLATFORM_REFERER: &str = "https://www.tiktok.com/";

/// Device the browsing context pretends to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    /// Windows desktop Chrome
    #[default]
    Desktop,
    /// iPhone Safari
    Mobile,
}

impl DeviceProfile {
    /// User agent string
    pub fn user_agent(&self) -> &'static str {
        match self {
            DeviceProfile::Desktop => DESKTOP_UA,
            DeviceProfile::Mobile => MOBILE_UA,
        }
    }

    /// Viewport width and height in CSS pixels
    pub fn viewport(&self) -> (u32, u32) {
        match self {
            DeviceProfile::Desktop => (1920, 1080),
            DeviceProfile::Mobile => (390, 844),
        }
    }

    /// Device pixel ratio
    pub fn device_scale_factor(&self) -> f64 {
        match self {
            DeviceProfile::Desktop => 1.0,
            DeviceProfile::Mobile => 3.0,
        }
    }

    /// Whether the device reports itself as mobile
    pub fn is_mobile(&self) -> bool {
        matches!(self, DeviceProfile::Mobile)
    }

    /// `navigator.platform` value
    pub fn platform(&self) -> &'static str {
        match self {
            DeviceProfile::Desktop => "Win32",
            DeviceProfile::Mobile => "iPhone",
        }
    }

    /// Locale
    pub fn locale(&self) -> &'static str {
        "en-US"
    }

    /// IANA timezone
    pub fn timezone(&self) -> &'static str {
        "America/New_York"
    }

    /// `Accept-Language` header value
    pub fn accept_language(&self) -> &'static str {
        "en-US,en;q=0.9"
    }

    /// `navigator.languages` value
    pub fn languages(&self) -> &'static [&'static str] {
        &["en-US", "en"]
    }

    /// Parse the `platform` query parameter; `auto` yields `None`
    pub fn from_platform_param(value: &str) -> std::result::Result<Option<Self>, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl FromStr for DeviceProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" | "pc" => Ok(DeviceProfile::Desktop),
            "mobile" | "phone" => Ok(DeviceProfile::Mobile),
            other => Err(format!("unknown device profile: {}", other)),
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Desktop => write!(f, "desktop"),
            DeviceProfile::Mobile => write!(f, "mobile"),
        }
    }
}

/// Stealth mode configuration and application
pub struct StealthMode;

impl StealthMode {
    /// Apply device emulation for `profile` to a fresh page
    #[instrument(skip(page))]
    pub async fn emulate(page: &Page, profile: DeviceProfile, user_agent: Option<&str>) -> Result<()> {
        let mut ua = SetUserAgentOverrideParams::new(user_agent.unwrap_or(profile.user_agent()));
        ua.accept_language = Some(profile.accept_language().to_string());
        ua.platform = Some(profile.platform().to_string());
        page.execute(ua).await?;

        let (width, height) = profile.viewport();
        page.execute(SetDeviceMetricsOverrideParams::new(
            width as i64,
            height as i64,
            profile.device_scale_factor(),
            profile.is_mobile(),
        ))
        .await?;

        let mut touch = SetTouchEmulationEnabledParams::new(profile.is_mobile());
        if profile.is_mobile() {
            touch.max_touch_points = Some(5);
        }
        page.execute(touch).await?;

        page.execute(SetLocaleOverrideParams {
            locale: Some(profile.locale().to_string()),
        })
        .await?;
        page.execute(SetTimezoneOverrideParams::new(profile.timezone()))
            .await?;

        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::json!({
                "Accept": "*/*",
                "Accept-Language": profile.accept_language(),
                "Referer": PLATFORM_REFERER,
            }),
        )))
        .await?;

        debug!("Emulating {} profile", profile);
        Ok(())
    }

    /// Apply all stealth techniques to a page
    #[instrument(skip(page))]
    pub async fn apply(page: &Page, profile: DeviceProfile) -> Result<()> {
        debug!("Applying stealth mode");

        for script in Self::scripts(profile) {
            Self::inject_script(page, &script).await?;
        }

        debug!("Stealth mode applied successfully");
        Ok(())
    }

    /// Scripts injected for a profile, in order
    pub fn scripts(profile: DeviceProfile) -> Vec<String> {
        let mut scripts = vec![
            Self::hide_webdriver().to_string(),
            Self::mock_languages(profile),
            Self::hide_automation_indicators(profile),
        ];
        if !profile.is_mobile() {
            scripts.push(Self::mock_chrome_runtime().to_string());
            scripts.push(Self::override_webgl().to_string());
            scripts.push(Self::mock_plugins().to_string());
        }
        scripts
    }

    /// Hide navigator.webdriver property
    fn hide_webdriver() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'webdriver', {
                get: () => undefined,
                configurable: true
            });
        "#
    }

    /// Mock Chrome runtime object
    fn mock_chrome_runtime() -> &'static str {
        r#"
            if (!window.chrome) {
                window.chrome = {};
            }
            if (!window.chrome.runtime) {
                window.chrome.runtime = {
                    connect: function() {},
                    sendMessage: function() {},
                    onMessage: {
                        addListener: function() {},
                        removeListener: function() {}
                    }
                };
            }
        "#
    }

    /// Override WebGL vendor/renderer fingerprinting
    fn override_webgl() -> &'static str {
        r#"
            const patchGetParameter = (proto) => {
                const original = proto.getParameter;
                proto.getParameter = function(parameter) {
                    // UNMASKED_VENDOR_WEBGL / UNMASKED_RENDERER_WEBGL
                    if (parameter === 37445) return 'Intel Inc.';
                    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                    return original.call(this, parameter);
                };
            };
            patchGetParameter(WebGLRenderingContext.prototype);
            if (typeof WebGL2RenderingContext !== 'undefined') {
                patchGetParameter(WebGL2RenderingContext.prototype);
            }
        "#
    }

    /// Seed a plausible navigator.plugins list
    fn mock_plugins() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'plugins', {
                get: () => {
                    const plugins = [
                        { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
                        { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
                        { name: 'Native Client', filename: 'internal-nacl-plugin' }
                    ];
                    plugins.item = (i) => plugins[i];
                    plugins.namedItem = (name) => plugins.find(p => p.name === name);
                    plugins.refresh = () => {};
                    return plugins;
                },
                configurable: true
            });
        "#
    }

    /// Mock navigator.languages for the profile's locale
    fn mock_languages(profile: DeviceProfile) -> String {
        let languages = serde_json::to_string(profile.languages()).unwrap_or_else(|_| "[]".into());
        format!(
            r#"
            Object.defineProperty(navigator, 'languages', {{
                get: () => {languages},
                configurable: true
            }});
            Object.defineProperty(navigator, 'language', {{
                get: () => '{locale}',
                configurable: true
            }});
        "#,
            languages = languages,
            locale = profile.locale()
        )
    }

    /// Hide other automation indicators
    fn hide_automation_indicators(profile: DeviceProfile) -> String {
        let touch_points = if profile.is_mobile() { 5 } else { 0 };
        format!(
            r#"
            Object.defineProperty(navigator, 'maxTouchPoints', {{
                get: () => {touch_points},
                configurable: true
            }});

            if (navigator.permissions) {{
                const originalQuery = navigator.permissions.query;
                navigator.permissions.query = (parameters) => (
                    parameters.name === 'notifications' ?
                        Promise.resolve({{ state: Notification.permission }}) :
                        originalQuery(parameters)
                );
            }}

            if (navigator.userAgentData) {{
                Object.defineProperty(navigator.userAgentData, 'brands', {{
                    get: () => [
                        {{ brand: 'Google Chrome', version: '120' }},
                        {{ brand: 'Chromium', version: '120' }},
                        {{ brand: 'Not_A Brand', version: '24' }}
                    ],
                    configurable: true
                }});
            }}
        "#,
            touch_points = touch_points
        )
    }

    /// Inject a script to run on new document
    async fn inject_script(page: &Page, script: &str) -> Result<()> {
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(script)
            .build()
            .map_err(|e| Error::cdp(format!("Failed to build script params: {}", e)))?;

        page.execute(params)
            .await
            .map_err(|e| Error::cdp(format!("Failed to inject script: {}", e)))?;

        Ok(())
    }
}
