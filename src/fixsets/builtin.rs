//! Rule builders for the built-in fix-sets

use super::{FixParams, pbx_quote};
use crate::patch::{Guard, Rule};
use regex::Regex;

/// Escape `$` so a value is inserted literally by a regex template
fn literal(value: &str) -> String {
    value.replace('$', "$$")
}

/// Matches a pbxproj `KEY = ...;` line for exactly this key
pub fn pbx_setting(key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?m)^[ \t]*{}[ \t]*=", regex::escape(key)))
}

/// Matches a Podfile `config.build_settings['KEY'] =` assignment
pub fn podfile_setting(key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"config\.build_settings\['{}'\][ \t]*=",
        regex::escape(key)
    ))
}

/// Pattern for the quoted value of a Podfile build setting, capturing the prefix
fn podfile_value_pattern(key: &str) -> String {
    format!(
        r"(config\.build_settings\['{}'\][ \t]*=[ \t]*)'[^']*'",
        regex::escape(key)
    )
}

/// Pattern for every pbxproj assignment of exactly `key`, capturing the indent
fn pbx_value_pattern(key: &str) -> String {
    format!(r"(?m)^([ \t]*){}[ \t]*=[ \t]*[^;]+;", regex::escape(key))
}

pub fn deployment_target(p: &FixParams) -> Result<Vec<Rule>, regex::Error> {
    let v = literal(&p.ios_version);
    Ok(vec![
        // Also uncomments the `# platform :ios, ...` line Flutter generates
        Rule::replace(
            "podfile-platform",
            &p.podfile,
            r"(?m)^[ \t]*#?[ \t]*platform :ios, '[^']*'",
            format!("platform :ios, '{}'", v),
        )?
        .describe("Podfile platform line"),
        Rule::replace(
            "podfile-deployment-target",
            &p.podfile,
            &podfile_value_pattern("IPHONEOS_DEPLOYMENT_TARGET"),
            format!("${{1}}'{}'", v),
        )?
        .describe("Podfile post_install deployment target"),
        Rule::replace(
            "pbxproj-deployment-target",
            &p.pbxproj,
            &pbx_value_pattern("IPHONEOS_DEPLOYMENT_TARGET"),
            format!("${{1}}IPHONEOS_DEPLOYMENT_TARGET = {};", v),
        )?
        .describe("every IPHONEOS_DEPLOYMENT_TARGET in the Xcode project"),
    ])
}

pub fn cpp14(p: &FixParams) -> Result<Vec<Rule>, regex::Error> {
    let s = &p.cxx_standard;
    Ok(vec![
        Rule::replace(
            "podfile-cxx-standard",
            &p.podfile,
            &podfile_value_pattern("CLANG_CXX_LANGUAGE_STANDARD"),
            format!("${{1}}'{}'", literal(s)),
        )?
        .describe("existing Podfile C++ standard"),
        Rule::insert_after(
            "podfile-cxx-insert",
            &p.podfile,
            r"config\.build_settings\['SWIFT_VERSION'\][ \t]*=[ \t]*'[^']*'",
            format!(
                "\n      config.build_settings['CLANG_CXX_LANGUAGE_STANDARD'] = '{}'\n      config.build_settings['CLANG_CXX_LIBRARY'] = 'libc++'",
                s
            ),
            Guard::LacksMatch(podfile_setting("CLANG_CXX_LANGUAGE_STANDARD")?),
        )?
        .describe("add C++ standard and libc++ after SWIFT_VERSION when missing"),
        Rule::replace(
            "pbxproj-cxx-standard",
            &p.pbxproj,
            &pbx_value_pattern("CLANG_CXX_LANGUAGE_STANDARD"),
            format!(
                "${{1}}CLANG_CXX_LANGUAGE_STANDARD = {};",
                literal(&pbx_quote(s))
            ),
        )?
        .describe("every CLANG_CXX_LANGUAGE_STANDARD in the Xcode project"),
    ])
}

pub fn c11(p: &FixParams) -> Result<Vec<Rule>, regex::Error> {
    let s = &p.c_standard;
    Ok(vec![
        Rule::replace(
            "podfile-c-standard",
            &p.podfile,
            &podfile_value_pattern("GCC_C_LANGUAGE_STANDARD"),
            format!("${{1}}'{}'", literal(s)),
        )?
        .describe("Podfile C language standard"),
        Rule::replace(
            "pbxproj-c-standard",
            &p.pbxproj,
            &pbx_value_pattern("GCC_C_LANGUAGE_STANDARD"),
            format!(
                "${{1}}GCC_C_LANGUAGE_STANDARD = {};",
                literal(&pbx_quote(s))
            ),
        )?
        .describe("every GCC_C_LANGUAGE_STANDARD in the Xcode project"),
    ])
}

/// Suffix Flutter gives the unit-test target's identifier
const TEST_TARGET_SUFFIX: &str = ".RunnerTests";

pub fn bundle_id(p: &FixParams, id: &str) -> Result<Vec<Rule>, regex::Error> {
    let id = id.to_string();
    Ok(vec![
        Rule::replace_with(
            "pbxproj-bundle-id",
            &p.pbxproj,
            r"(?m)^([ \t]*)PRODUCT_BUNDLE_IDENTIFIER[ \t]*=[ \t]*([^;]+);",
            move |caps| {
                let current = caps[2].trim().trim_matches('"');
                let suffix = if current.ends_with(TEST_TARGET_SUFFIX) {
                    TEST_TARGET_SUFFIX
                } else {
                    ""
                };
                format!(
                    "{}PRODUCT_BUNDLE_IDENTIFIER = {};",
                    &caps[1],
                    pbx_quote(&format!("{}{}", id, suffix))
                )
            },
        )?
        .describe("app and test-target bundle identifiers"),
    ])
}

/// Settings every buildSettings block must carry for device builds
fn device_settings(p: &FixParams) -> Vec<(&'static str, String)> {
    vec![
        ("SUPPORTED_PLATFORMS", "iphoneos".to_string()),
        ("SDKROOT", "iphoneos".to_string()),
        ("TARGETED_DEVICE_FAMILY", pbx_quote("1,2")),
        ("IPHONEOS_DEPLOYMENT_TARGET", pbx_quote(&p.ios_version)),
        ("GCC_C_LANGUAGE_STANDARD", pbx_quote(&p.c_standard)),
        ("CLANG_CXX_LANGUAGE_STANDARD", pbx_quote(&p.cxx_standard)),
        ("CLANG_CXX_LIBRARY", pbx_quote("libc++")),
        ("ENABLE_BITCODE", "NO".to_string()),
    ]
}

pub fn target_device(p: &FixParams) -> Result<Vec<Rule>, regex::Error> {
    let settings: Vec<(Regex, String)> = device_settings(p)
        .into_iter()
        .map(|(key, value)| Ok((pbx_setting(key)?, format!("{} = {};", key, value))))
        .collect::<Result<_, regex::Error>>()?;

    Ok(vec![
        Rule::replace_with(
            "pbxproj-device-settings",
            &p.pbxproj,
            r"(?s)(buildSettings = \{)(.*?)(\n([ \t]*)\};)",
            move |caps| {
                let body = &caps[2];
                let indent = format!("{}\t", &caps[4]);
                let mut additions = String::new();
                for (present, line) in &settings {
                    if !present.is_match(body) {
                        additions.push('\n');
                        additions.push_str(&indent);
                        additions.push_str(line);
                    }
                }
                format!("{}{}{}{}", &caps[1], body, additions, &caps[3])
            },
        )?
        .describe("add missing device settings to every buildSettings block"),
    ])
}

pub fn xcode_version(p: &FixParams) -> Result<Vec<Rule>, regex::Error> {
    Ok(vec![
        Rule::replace(
            "ci-xcode-version",
            &p.ci,
            r"(?m)^([ \t]*xcode:[ \t]*)[^\s#]+",
            format!("${{1}}{}", literal(&p.xcode_version)),
        )?
        .describe("xcode entries of the CI descriptor"),
    ])
}
