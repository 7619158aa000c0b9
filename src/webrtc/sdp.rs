//! SDP munging applied once to every locally-generated offer (§4.4),
//! grounded on `original_source/src/selkies/rtc.py::munge_sdp`.

use regex::Regex;

/// Ensure `rtx-time=125` on every `apt=` fmtp line, `sps-pps-idr-in-keyframe=1`
/// on every H.264/H.265 `packetization-mode=` fmtp line, and `a=ptime:10`
/// immediately after Opus's `sprop-` fmtp line.
pub fn munge_sdp(sdp: &str) -> String {
    let mut sdp = inject_rtx_time(sdp);
    sdp = inject_sps_pps_idr(&sdp);
    sdp = inject_opus_ptime(&sdp);
    sdp
}

fn inject_rtx_time(sdp: &str) -> String {
    let apt_re = Regex::new(r"apt=\d+").unwrap();
    if !sdp.contains("rtx-time") {
        apt_re.replace_all(sdp, |caps: &regex::Captures| format!("{};rtx-time=125", &caps[0])).into_owned()
    } else if !sdp.contains("rtx-time=125") {
        let rtx_re = Regex::new(r"rtx-time=\d+").unwrap();
        rtx_re.replace_all(sdp, "rtx-time=125").into_owned()
    } else {
        sdp.to_string()
    }
}

fn inject_sps_pps_idr(sdp: &str) -> String {
    if !sdp.contains("packetization-mode=") {
        return sdp.to_string();
    }
    if !sdp.contains("sps-pps-idr-in-keyframe") {
        sdp.replace("packetization-mode=", "sps-pps-idr-in-keyframe=1;packetization-mode=")
    } else if !sdp.contains("sps-pps-idr-in-keyframe=1") {
        let re = Regex::new(r"sps-pps-idr-in-keyframe=\d+").unwrap();
        re.replace_all(sdp, "sps-pps-idr-in-keyframe=1").into_owned()
    } else {
        sdp.to_string()
    }
}

fn inject_opus_ptime(sdp: &str) -> String {
    if !sdp.contains("sprop-") {
        return sdp.to_string();
    }
    let re = Regex::new(r"([^-]sprop-[^\r\n]+)").unwrap();
    re.replace_all(sdp, "$1\r\na=ptime:10").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_rtx_time_when_absent() {
        let sdp = "a=fmtp:98 apt=97\r\n";
        let munged = munge_sdp(sdp);
        assert!(munged.contains("apt=97;rtx-time=125"));
    }

    #[test]
    fn fixes_wrong_rtx_time_value() {
        let sdp = "a=fmtp:98 apt=97;rtx-time=3000\r\n";
        let munged = munge_sdp(sdp);
        assert!(munged.contains("rtx-time=125"));
        assert!(!munged.contains("rtx-time=3000"));
    }

    #[test]
    fn injects_sps_pps_idr_in_keyframe() {
        let sdp = "a=fmtp:102 level-asymmetry-allowed=1;packetization-mode=1\r\n";
        let munged = munge_sdp(sdp);
        assert!(munged.contains("sps-pps-idr-in-keyframe=1;packetization-mode=1"));
    }

    #[test]
    fn injects_opus_ptime_after_sprop_line() {
        let sdp = "a=fmtp:111 minptime=10;useinbandfec=1;sprop-stereo=1\r\n";
        let munged = munge_sdp(sdp);
        assert!(munged.contains("sprop-stereo=1\r\na=ptime:10"));
    }

    #[test]
    fn is_idempotent_when_rules_already_satisfied() {
        let sdp = "a=fmtp:98 apt=97;rtx-time=125\r\n";
        assert_eq!(munge_sdp(sdp), munge_sdp(&munge_sdp(sdp)));
    }
}
