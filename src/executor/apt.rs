//! Invocations of apt-get, apt-cache and apt-mark.
use super::Invocation;

/// Keep locally modified configuration files on upgrade
const FORCE_CONFOLD: &str = "--option=Dpkg::Options::=--force-confold";

fn apt_get() -> Invocation {
    Invocation::new("apt-get")
        .arg("-y")
        .elevate()
        .noninteractive()
}

/// `targets` are bare names or `name=version` pins.
pub fn install<S: AsRef<str>>(targets: &[S], allow_downgrades: bool) -> Invocation {
    let mut inv = apt_get().arg(FORCE_CONFOLD);
    if allow_downgrades {
        inv = inv.arg("--allow-downgrades");
    }
    inv.arg("install")
        .args(targets.iter().map(|t| t.as_ref().to_owned()))
}

pub fn remove<S: AsRef<str>>(names: &[S], purge: bool) -> Invocation {
    apt_get()
        .arg(if purge { "purge" } else { "remove" })
        .args(names.iter().map(|n| n.as_ref().to_owned()))
}

pub fn update() -> Invocation {
    Invocation::new("apt-get")
        .args(["update", "--error-on=any"])
        .elevate()
        .noninteractive()
}

pub fn policy<S: AsRef<str>>(names: &[S]) -> Invocation {
    Invocation::new("apt-cache")
        .arg("policy")
        .args(names.iter().map(|n| n.as_ref().to_owned()))
}

pub fn show<S: AsRef<str>>(names: &[S]) -> Invocation {
    Invocation::new("apt-cache")
        .arg("show")
        .args(names.iter().map(|n| n.as_ref().to_owned()))
}

pub fn hold(name: &str) -> Invocation {
    Invocation::new("apt-mark")
        .args(["hold", name])
        .elevate()
}

pub fn unhold(name: &str) -> Invocation {
    Invocation::new("apt-mark")
        .args(["unhold", name])
        .elevate()
}

pub fn showhold() -> Invocation {
    Invocation::new("apt-mark").arg("showhold")
}
