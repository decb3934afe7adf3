use regex::Regex;
use once_cell::sync::Lazy;
use std::collections::HashMap;

// Ordered so that the more specific texts are tried first (LGPL before GPL, BSD-3 before BSD-2)
static LICENSE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let patterns = [
        (
            "MIT",
            r"(?is)(Permission is hereby granted, free of charge,.*subject to the following conditions|The MIT License|MIT License Copyright)",
        ),
        (
            "Apache-2.0",
            r"(?is)(Apache License.*Version 2\.0|Licensed under the Apache License, Version 2\.0)",
        ),
        ("LGPL-2.1", r"(?is)GNU Lesser General Public License.*Version 2\.1"),
        ("LGPL-3.0", r"(?is)GNU Lesser General Public License.*Version 3"),
        ("GPL-3.0", r"(?is)GNU General Public License.*Version 3"),
        ("GPL-2.0", r"(?is)GNU General Public License.*Version 2"),
        (
            "BSD-3-Clause",
            r"(?is)(redistribution and use.*permitted provided that.*neither the name.*nor the names of|3-Clause BSD License)",
        ),
        (
            "BSD-2-Clause",
            r"(?is)redistribution and use.*permitted provided that.*binary form must",
        ),
        ("ISC", r"(?is)ISC License.*Permission to use, copy, modify, and/or distribute"),
        ("Unlicense", r"(?is)This is free and unencumbered software released into the public domain"),
        ("MPL-2.0", r"(?is)(Mozilla Public License.*Version 2\.0|MPL 2\.0)"),
        ("PSF-2.0", r"(?is)PYTHON SOFTWARE FOUNDATION LICENSE VERSION 2"),
    ];

    patterns
        .iter()
        .map(|(id, pattern)| (*id, Regex::new(pattern).unwrap()))
        .collect()
});

// Canonical pages for the identifiers the registry commonly reports
static LICENSE_URLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("MIT", "https://opensource.org/licenses/MIT");
    map.insert("Apache-2.0", "https://opensource.org/licenses/Apache-2.0");
    map.insert("BSD-2-Clause", "https://opensource.org/licenses/BSD-2-Clause");
    map.insert("BSD-3-Clause", "https://opensource.org/licenses/BSD-3-Clause");
    map.insert("GPL-2.0", "https://www.gnu.org/licenses/old-licenses/gpl-2.0.en.html");
    map.insert("GPL-3.0", "https://www.gnu.org/licenses/gpl-3.0.en.html");
    map.insert("LGPL-2.1", "https://www.gnu.org/licenses/old-licenses/lgpl-2.1.en.html");
    map.insert("LGPL-3.0", "https://www.gnu.org/licenses/lgpl-3.0.en.html");
    map.insert("ISC", "https://opensource.org/licenses/ISC");
    map.insert("MPL-2.0", "https://opensource.org/licenses/MPL-2.0");
    map.insert("PSF-2.0", "https://opensource.org/licenses/Python-2.0");
    map.insert("CC0-1.0", "https://creativecommons.org/publicdomain/zero/1.0/");
    map.insert("Unlicense", "https://unlicense.org/");
    map.insert("Zlib", "https://opensource.org/licenses/Zlib");

    map
});

// Trove classifiers mapped to SPDX identifiers
const CLASSIFIER_LICENSES: [(&str, &str); 16] = [
    ("License :: OSI Approved :: MIT License", "MIT"),
    ("License :: OSI Approved :: Apache Software License", "Apache-2.0"),
    ("License :: OSI Approved :: BSD 3-Clause License", "BSD-3-Clause"),
    ("License :: OSI Approved :: BSD 2-Clause License", "BSD-2-Clause"),
    ("License :: OSI Approved :: BSD License", "BSD-3-Clause"),
    ("License :: OSI Approved :: GNU General Public License v3 (GPLv3)", "GPL-3.0"),
    ("License :: OSI Approved :: GNU General Public License v2 (GPLv2)", "GPL-2.0"),
    ("License :: OSI Approved :: GNU Lesser General Public License v3 (LGPLv3)", "LGPL-3.0"),
    ("License :: OSI Approved :: GNU Lesser General Public License v2 or later (LGPLv2+)", "LGPL-2.1"),
    ("License :: OSI Approved :: Mozilla Public License 2.0 (MPL 2.0)", "MPL-2.0"),
    ("License :: OSI Approved :: ISC License (ISCL)", "ISC"),
    ("License :: OSI Approved :: Python Software Foundation License", "PSF-2.0"),
    ("License :: OSI Approved :: zlib/libpng License", "Zlib"),
    ("License :: OSI Approved :: The Unlicense (Unlicense)", "Unlicense"),
    ("License :: CC0 1.0 Universal (CC0 1.0) Public Domain Dedication", "CC0-1.0"),
    ("License :: Public Domain", "Unlicense"),
];

/// Attempt to detect license type from license text
pub fn detect_license_from_text(text: &str) -> Option<String> {
    LICENSE_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(id, _)| id.to_string())
}

/// Clean up commonly found license variations
pub fn normalize_license_id(license: &str) -> String {
    match license.trim().to_lowercase().as_str() {
        "mit" | "mit license" => "MIT".to_string(),
        "apache2" | "apache 2" | "apache2.0" | "apache 2.0" | "apache-2" | "apache license 2.0" | "apache software license" =>
            "Apache-2.0".to_string(),
        "bsd" | "bsd license" | "bsd-3" | "new bsd" | "new bsd license" => "BSD-3-Clause".to_string(),
        "bsd-2" | "simplified bsd" => "BSD-2-Clause".to_string(),
        "gpl" | "gpl3" | "gplv3" | "gpl-3" => "GPL-3.0".to_string(),
        "gpl2" | "gplv2" | "gpl-2" => "GPL-2.0".to_string(),
        "isc license" | "iscl" => "ISC".to_string(),
        "psf" | "psfl" | "python software foundation license" => "PSF-2.0".to_string(),
        "public domain" => "Unlicense".to_string(),
        _ => license.trim().to_string(),
    }
}

/// Map the first recognised license classifier to an SPDX identifier.
pub fn license_from_classifiers<S: AsRef<str>>(classifiers: &[S]) -> Option<String> {
    for classifier in classifiers.iter().map(|c| c.as_ref()) {
        if let Some((_, id)) = CLASSIFIER_LICENSES.iter().find(|(c, _)| classifier == *c) {
            return Some(id.to_string());
        }

        // Anything else under the OSI tree is normalized from its display name
        if let Some(name) = classifier.strip_prefix("License :: OSI Approved :: ") {
            return Some(normalize_license_id(name));
        }
    }

    None
}

/// Resolve the license reported in a registry `license` field. Some projects
/// paste the entire license text there, so long values are matched against
/// known license texts instead of being used verbatim.
pub fn resolve_license_field(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
        return None;
    }

    if value.lines().count() > 1 || value.len() > 80 {
        return detect_license_from_text(value);
    }

    Some(normalize_license_id(value))
}

pub fn get_license_url(license: &str) -> Option<String> {
    LICENSE_URLS.get(license).map(|&url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_license_id() {
        assert_eq!(normalize_license_id("mit"), "MIT");
        assert_eq!(normalize_license_id(" Apache 2.0 "), "Apache-2.0");
        assert_eq!(normalize_license_id("BSD"), "BSD-3-Clause");
        assert_eq!(normalize_license_id("Custom-1.0"), "Custom-1.0");
    }

    #[test]
    fn test_license_from_classifiers() {
        let classifiers = vec![
            "Development Status :: 5 - Production/Stable",
            "License :: OSI Approved :: Apache Software License",
        ];
        assert_eq!(license_from_classifiers(&classifiers), Some("Apache-2.0".to_string()));

        let classifiers = vec!["License :: OSI Approved :: MIT License"];
        assert_eq!(license_from_classifiers(&classifiers), Some("MIT".to_string()));

        let classifiers = vec!["License :: OSI Approved :: Artistic License"];
        assert_eq!(license_from_classifiers(&classifiers), Some("Artistic License".to_string()));

        let classifiers: Vec<&str> = vec!["Programming Language :: Python :: 3"];
        assert_eq!(license_from_classifiers(&classifiers), None);
    }

    #[test]
    fn test_resolve_license_field_detects_pasted_text() {
        let text = "Copyright (c) 2020 Someone\n\nPermission is hereby granted, free of charge, to any person \
                    obtaining a copy of this software, subject to the following conditions:\n...";
        assert_eq!(resolve_license_field(text), Some("MIT".to_string()));
        assert_eq!(resolve_license_field("apache 2.0"), Some("Apache-2.0".to_string()));
        assert_eq!(resolve_license_field(""), None);
        assert_eq!(resolve_license_field("UNKNOWN"), None);
    }

    #[test]
    fn test_lgpl_is_not_reported_as_gpl() {
        let text = "GNU Lesser General Public License\nVersion 2.1, February 1999";
        assert_eq!(detect_license_from_text(text), Some("LGPL-2.1".to_string()));
    }

    #[test]
    fn test_get_license_url() {
        assert_eq!(get_license_url("MIT"), Some("https://opensource.org/licenses/MIT".to_string()));
        assert_eq!(get_license_url("Proprietary"), None);
    }
}
