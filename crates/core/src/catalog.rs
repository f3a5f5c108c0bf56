//! The fixed probe battery for camera hosts.
//!
//! Group and probe order is part of the report layout. Probes that depend on
//! earlier probes must be declared after them; nothing here loads or unloads
//! modules, so every module gate sees the state the host started with.

use crate::capability::Capability;
use crate::probe::{Operation, Precondition, ProbeDefinition, ProbeGroup};

const VIDEO_LOG_PATTERN: &str = "video|v4l|camera|uvc|vivid|unicam|imx|ov5647";

pub fn standard_groups(target: &str) -> Vec<ProbeGroup> {
    vec![
        system_info(),
        device_enumeration(),
        capability_detection(target),
        module_info(),
        configuration(),
        target_device_detail(target),
        process_usage(target),
        topology(),
        peripheral_buses(),
        log_tail(),
    ]
}

fn system_info() -> ProbeGroup {
    ProbeGroup::new(
        "SYSTEM INFORMATION",
        vec![
            ProbeDefinition::new("Kernel version", Operation::exec("uname", &["-a"])),
            ProbeDefinition::new("OS release", Operation::read_file("/etc/os-release")).when(
                Precondition::requires(
                    Capability::file("/etc/os-release"),
                    "/etc/os-release missing",
                ),
            ),
            ProbeDefinition::new(
                "Raspberry Pi model",
                Operation::read_file("/proc/device-tree/model"),
            )
            .when(Precondition::requires(
                Capability::file("/proc/device-tree/model"),
                "Not a Raspberry Pi or file missing",
            )),
            ProbeDefinition::new("Uptime and load", Operation::exec("uptime", &[]))
                .requires_command("uptime"),
            ProbeDefinition::new("Memory", Operation::exec("free", &["-h"]))
                .requires_command("free"),
        ],
    )
}

fn device_enumeration() -> ProbeGroup {
    ProbeGroup::new(
        "VIDEO DEVICE ENUMERATION",
        vec![
            ProbeDefinition::new("Video device nodes", Operation::shell("ls -la /dev/video*")),
            ProbeDefinition::new("Media device nodes", Operation::shell("ls -la /dev/media*")),
            ProbeDefinition::new(
                "video4linux sysfs names",
                Operation::shell(
                    "for d in /sys/class/video4linux/*; do echo \"$(basename \"$d\"): $(cat \"$d/name\")\"; done",
                ),
            ),
            ProbeDefinition::new(
                "V4L2 device list",
                Operation::exec("v4l2-ctl", &["--list-devices"]),
            )
            .requires_command("v4l2-ctl"),
        ],
    )
}

fn capability_detection(target: &str) -> ProbeGroup {
    ProbeGroup::new(
        "CAPABILITY DETECTION",
        vec![
            ProbeDefinition::new(
                "Target driver info",
                Operation::exec("v4l2-ctl", &["-d", target, "--info"]),
            )
            .requires_command("v4l2-ctl"),
            ProbeDefinition::new(
                "Target pixel formats",
                Operation::exec("v4l2-ctl", &["-d", target, "--list-formats"]),
            )
            .requires_command("v4l2-ctl"),
            ProbeDefinition::new(
                "libcamera cameras",
                Operation::shell(
                    "if command -v rpicam-hello >/dev/null 2>&1; then rpicam-hello --list-cameras; else libcamera-hello --list-cameras; fi",
                ),
            )
            .when(Precondition::any_of(
                vec![
                    Capability::command("rpicam-hello"),
                    Capability::command("libcamera-hello"),
                ],
                "libcamera apps not installed",
            )),
        ],
    )
}

fn module_info() -> ProbeGroup {
    ProbeGroup::new(
        "KERNEL MODULE INFORMATION",
        vec![
            ProbeDefinition::new(
                "Loaded video modules",
                Operation::shell(
                    "lsmod | grep -E 'videodev|v4l2|videobuf|vivid|uvcvideo|bcm2835|unicam' || true",
                ),
            )
            .requires_command("lsmod"),
            ProbeDefinition::new("vivid module details", Operation::exec("modinfo", &["vivid"]))
                .requires_command("modinfo"),
            ProbeDefinition::new(
                "vivid module parameters",
                Operation::shell("grep -H . /sys/module/vivid/parameters/*"),
            )
            .when(Precondition::requires(
                Capability::module("vivid"),
                "vivid module not loaded",
            )),
            ProbeDefinition::new(
                "uvcvideo module parameters",
                Operation::shell("grep -H . /sys/module/uvcvideo/parameters/*"),
            )
            .when(Precondition::requires(
                Capability::module("uvcvideo"),
                "uvcvideo module not loaded",
            )),
        ],
    )
}

fn configuration() -> ProbeGroup {
    ProbeGroup::new(
        "CONFIGURATION",
        vec![
            ProbeDefinition::new(
                "Boot config (/boot/firmware/config.txt)",
                Operation::read_file("/boot/firmware/config.txt"),
            )
            .when(Precondition::requires(
                Capability::file("/boot/firmware/config.txt"),
                "file not found",
            )),
            ProbeDefinition::new(
                "Legacy boot config (/boot/config.txt)",
                Operation::read_file("/boot/config.txt"),
            )
            .when(Precondition::requires(
                Capability::file("/boot/config.txt"),
                "file not found",
            )),
            ProbeDefinition::new(
                "Module options",
                Operation::shell("grep -H . /etc/modprobe.d/*.conf"),
            ),
            ProbeDefinition::new("Invoking user groups", Operation::exec("id", &[]))
                .requires_command("id"),
            ProbeDefinition::new(
                "udev rules",
                Operation::exec("ls", &["-la", "/etc/udev/rules.d/"]),
            ),
        ],
    )
}

fn target_device_detail(target: &str) -> ProbeGroup {
    let gate = || {
        Precondition::all_of(
            vec![Capability::command("v4l2-ctl"), Capability::file(target)],
            "v4l2-ctl not installed or target device missing",
        )
    };
    let v4l2 = |description: &str, flag: &str| {
        ProbeDefinition::new(description, Operation::exec("v4l2-ctl", &["-d", target, flag]))
            .when(gate())
    };

    ProbeGroup::new(
        format!("TARGET DEVICE DETAIL ({target})"),
        vec![
            ProbeDefinition::new("Device node", Operation::exec("ls", &["-la", target])),
            v4l2("All device settings", "--all"),
            v4l2("Formats with frame sizes", "--list-formats-ext"),
            v4l2("Controls", "--list-ctrls-menus"),
            v4l2("Current video format", "--get-fmt-video"),
            v4l2("Streaming parameters", "--get-parm"),
        ],
    )
}

fn process_usage(target: &str) -> ProbeGroup {
    ProbeGroup::new(
        "PROCESS USAGE",
        vec![
            ProbeDefinition::new(
                "Processes holding the target",
                Operation::shell(format!(
                    "fuser -v {target} || echo 'No processes are using {target}'"
                )),
            )
            .requires_command("fuser"),
            ProbeDefinition::new(
                "Open video handles",
                Operation::shell("lsof /dev/video* /dev/media* || true"),
            )
            .requires_command("lsof"),
        ],
    )
}

fn topology() -> ProbeGroup {
    ProbeGroup::new(
        "MEDIA TOPOLOGY",
        vec![ProbeDefinition::new(
            "Media controller topology",
            Operation::shell("for m in /dev/media*; do echo \"== $m\"; media-ctl -d \"$m\" -p; done"),
        )
        .requires_command("media-ctl")],
    )
}

fn peripheral_buses() -> ProbeGroup {
    ProbeGroup::new(
        "PERIPHERAL BUSES",
        vec![
            ProbeDefinition::new("USB devices", Operation::exec("lsusb", &[]))
                .requires_command("lsusb"),
            ProbeDefinition::new("USB topology", Operation::exec("lsusb", &["-t"]))
                .requires_command("lsusb"),
            ProbeDefinition::new("I2C buses", Operation::exec("i2cdetect", &["-l"]))
                .requires_command("i2cdetect"),
        ],
    )
}

fn log_tail() -> ProbeGroup {
    ProbeGroup::new(
        "KERNEL LOGS",
        vec![
            ProbeDefinition::new(
                "Video-related kernel messages",
                Operation::shell(format!(
                    "dmesg | grep -iE '{VIDEO_LOG_PATTERN}' | tail -n 50"
                )),
            )
            .requires_command("dmesg"),
            ProbeDefinition::new(
                "Recent kernel messages",
                Operation::shell("dmesg | tail -n 30"),
            )
            .requires_command("dmesg"),
            ProbeDefinition::new(
                "Kernel journal (video)",
                Operation::shell(format!(
                    "journalctl -k --no-pager -n 200 | grep -iE '{VIDEO_LOG_PATTERN}' | tail -n 50"
                )),
            )
            .requires_command("journalctl"),
        ],
    )
}

/// Every distinct capability the groups gate on, in first-use order.
pub fn referenced_capabilities(groups: &[ProbeGroup]) -> Vec<Capability> {
    let mut seen = Vec::new();
    for capability in groups
        .iter()
        .flat_map(|group| &group.probes)
        .filter_map(|probe| probe.precondition.as_ref())
        .flat_map(|precondition| precondition.capabilities())
    {
        if !seen.contains(capability) {
            seen.push(capability.clone());
        }
    }
    seen
}
