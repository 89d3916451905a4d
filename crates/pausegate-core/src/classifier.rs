use regex::Regex;
use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::signal::ForegroundSignal;

/// Surfaces that pop over the current app without the user leaving it
const TRANSIENT_PACKAGES: &[&str] = &[
    // System UI (notifications, volume, quick settings, heads-up)
    "com.android.systemui",
    "com.samsung.android.systemui",
    "com.miui.securitycenter",
    // Keyboards
    "com.google.android.inputmethod.latin",
    "com.samsung.android.honeyboard",
    "com.touchtype.swiftkey",
    "com.sec.android.inputmethod",
    // Voice assistants
    "com.google.android.googlequicksearchbox",
    "com.samsung.android.bixby.agent",
    "com.samsung.android.visionintelligence",
    // Permission prompts and installers
    "com.android.permissioncontroller",
    "com.google.android.permissioncontroller",
    "com.android.packageinstaller",
    "com.google.android.packageinstaller",
    "com.samsung.android.packageinstaller",
    "com.miui.packageinstaller",
    // Share sheets and intent choosers
    "android",
    "com.android.intentresolver",
    "com.samsung.android.app.sharelive",
    // Calls
    "com.samsung.android.incallui",
    "com.google.android.dialer",
    // Settings panels and file pickers
    "com.android.settings",
    "com.android.documentsui",
    "com.google.android.documentsui",
];

/// Substrings that mark keyboards and call screens from any vendor
const TRANSIENT_PATTERN: &str = r"inputmethod|keyboard|incallui|dialer";

const LAUNCHER_PREFIXES: &[&str] = &[
    "com.android.launcher",
    "com.google.android.launcher",
    "com.sec.android.app.launcher",
    "com.miui.home",
    "com.huawei.android.launcher",
    "com.oppo.launcher",
    "com.vivo.launcher",
    "com.oneplus.launcher",
    "com.realme.launcher",
    "com.asus.launcher",
    "com.lge.launcher",
    "com.sonyericsson.home",
    "com.nothing.launcher",
];

const LAUNCHER_PACKAGES: &[&str] = &[
    "com.google.android.apps.nexuslauncher",
    "com.teslacoilsw.launcher",
    "com.microsoft.launcher",
    "com.niagara.launcher",
    "com.actionlauncher.playstore",
    "com.smartlauncher.nexus",
    "bitpit.launcher",
];

/// What a foreground change means for the tracked session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Same package as the tracked foreground (internal window change)
    SamePackage(String),
    /// Keyboard, system dialog, the host app, or an unusable identifier
    TransientOverlay,
    /// Launcher/home screen: the user left the current app
    HomeOrSystem(String),
    /// Genuine switch into another application
    RealSwitch(String),
}

/// Classifies foreground-change signals.
/// Priority: same package > transient overlay > launcher > real switch
pub struct TransitionClassifier {
    transient_packages: HashSet<String>,
    transient_pattern: Regex,
    launcher_packages: HashSet<String>,
    launcher_prefix: Regex,
}

impl TransitionClassifier {
    /// Build the classifier from the built-in tables plus configured additions
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut transient_packages: HashSet<String> =
            TRANSIENT_PACKAGES.iter().map(|p| (*p).to_string()).collect();
        transient_packages.insert(config.host_package.clone());
        transient_packages.extend(config.extra_transient_packages.iter().cloned());

        let prefixes: Vec<String> = LAUNCHER_PREFIXES
            .iter()
            .map(|p| (*p).to_string())
            .chain(config.extra_launcher_prefixes.iter().cloned())
            .map(|p| regex::escape(&p))
            .collect();
        let launcher_prefix = Regex::new(&format!("^(?:{})", prefixes.join("|")))?;

        log::debug!(
            "Classifier loaded {} transient packages, {} launcher prefixes",
            transient_packages.len(),
            prefixes.len()
        );

        Ok(Self {
            transient_packages,
            transient_pattern: Regex::new(TRANSIENT_PATTERN)?,
            launcher_packages: LAUNCHER_PACKAGES.iter().map(|p| (*p).to_string()).collect(),
            launcher_prefix,
        })
    }

    /// Classify a signal against the currently tracked foreground package
    #[must_use]
    pub fn classify(&self, signal: &ForegroundSignal, current: Option<&str>) -> Transition {
        let Some(package) = signal.package_id() else {
            log::debug!("Unusable package identifier {:?}, treating as overlay", signal.package);
            return Transition::TransientOverlay;
        };

        if current == Some(package) {
            return Transition::SamePackage(package.to_string());
        }

        if self.is_transient(package) || signal.window.is_some_and(|w| w.is_overlay()) {
            log::debug!("'{package}' classified as transient overlay");
            return Transition::TransientOverlay;
        }

        if self.is_launcher(package) {
            log::debug!("'{package}' classified as launcher");
            return Transition::HomeOrSystem(package.to_string());
        }

        Transition::RealSwitch(package.to_string())
    }

    #[must_use]
    pub fn is_transient(&self, package: &str) -> bool {
        self.transient_packages.contains(package) || self.transient_pattern.is_match(package)
    }

    #[must_use]
    pub fn is_launcher(&self, package: &str) -> bool {
        self.launcher_packages.contains(package) || self.launcher_prefix.is_match(package)
    }
}
