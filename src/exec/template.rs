// src/exec/template.rs

use tracing::trace;

/// Expand `$key` placeholders in a configured command template.
///
/// Substitution is plain string replacement applied longest-key-first, so
/// `$src_path` is never clobbered by a shorter `$src` key. Unknown
/// placeholders are left in place; the resulting command will then fail
/// loudly instead of silently running against the wrong path.
pub fn expand_template(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(&str, &str)> = substitutions.to_vec();
    pairs.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("${key}"), value);
    }
    trace!(template, expanded = %out, "expanded command template");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_simple_placeholders() {
        let cmd = expand_template(
            "xrdfs $server ls -l $location",
            &[("server", "eos.cern.ch"), ("location", "/data/in")],
        );
        assert_eq!(cmd, "xrdfs eos.cern.ch ls -l /data/in");
    }

    #[test]
    fn longer_keys_win_over_prefixes() {
        let cmd = expand_template(
            "cp $src_path $dst_path # $src",
            &[("src", "S"), ("src_path", "/a"), ("dst_path", "/b")],
        );
        assert_eq!(cmd, "cp /a /b # S");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let cmd = expand_template("rm $path", &[("server", "x")]);
        assert_eq!(cmd, "rm $path");
    }
}
