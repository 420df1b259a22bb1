//! Vendor identity prefixes.
//!
//! Two fixed lists drive every cheap check the classifier makes: identifiers
//! that are never flagged, and reverse-domain prefixes that mark a vendor.
//! The flagged list is compiled once into a single anchored alternation.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

pub const SKIP_PREFIXES: &[&str] = &[
    "com.google",
    "com.android.chrome",
    "com.android.vending",
    "com.microsoft",
    "com.apple",
    "com.zhiliaoapp.musically",
];

pub const FLAGGED_PREFIXES: &[&str] = &[
    "com.tencent",
    "com.alibaba",
    "com.umeng",
    "com.qihoo",
    "com.ali",
    "com.alipay",
    "com.amap",
    "com.sina",
    "com.weibo",
    "com.vivo",
    "com.xiaomi",
    "com.huawei",
    "com.taobao",
    "com.secneo",
    "s.h.e.l.l",
    "com.stub",
    "com.kiwisec",
    "com.secshell",
    "com.wrapper",
    "cn.securitystack",
    "com.mogosec",
    "com.secoen",
    "com.netease",
    "com.mx",
    "com.qq.e",
    "com.baidu",
    "com.bytedance",
    "com.bugly",
    "com.miui",
    "com.oppo",
    "com.coloros",
    "com.iqoo",
    "com.meizu",
    "com.gionee",
    "cn.nubia",
    "com.oplus",
    "andes.oplus",
    "com.unionpay",
    "cn.wps",
];

/// Archive entries starting with this prefix mark a vendor-neutral library
/// bundle; their presence ends the bytecode scan with "not flagged".
pub const NEUTRAL_LIBRARY_MARKER: &str = "firebase-";

/// Builds `^(?:p1|p2|...).*$` with every prefix escaped literally.
///
/// The whole name has to match, so a prefix only ever matches at the start.
pub fn build_pattern<S: AsRef<str>>(prefixes: &[S]) -> Result<Regex> {
    let alternation = prefixes
        .iter()
        .map(|p| regex::escape(p.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    let source = format!("^(?:{alternation}).*$");
    Regex::new(&source).with_context(|| format!("Failed to compile vendor pattern: {source}"))
}

#[derive(Debug, Clone)]
pub struct VendorPatterns {
    skip: Vec<String>,
    flagged: Regex,
}

impl VendorPatterns {
    pub fn new<S: AsRef<str>>(skip: &[S], flagged_prefixes: &[S]) -> Result<Self> {
        Ok(Self {
            skip: skip.iter().map(|s| s.as_ref().to_string()).collect(),
            flagged: build_pattern(flagged_prefixes)?,
        })
    }

    /// The built-in lists, compiled on first use and shared for the process.
    pub fn builtin() -> &'static VendorPatterns {
        static BUILTIN: OnceLock<VendorPatterns> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            VendorPatterns::new(SKIP_PREFIXES, FLAGGED_PREFIXES)
                .expect("built-in prefixes are escaped literals")
        })
    }

    /// True when `id` equals a skip entry or is a dot-delimited descendant of one.
    pub fn is_skipped(&self, id: &str) -> bool {
        self.skip.iter().any(|s| {
            id.strip_prefix(s.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
    }

    pub fn is_flagged_name(&self, name: &str) -> bool {
        self.flagged.is_match(name)
    }

    pub fn flagged(&self) -> &Regex {
        &self.flagged
    }
}

pub fn is_skipped_identifier(id: &str) -> bool {
    VendorPatterns::builtin().is_skipped(id)
}

pub fn flagged_pattern() -> &'static Regex {
    VendorPatterns::builtin().flagged()
}
