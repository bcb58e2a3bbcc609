//! First-boot admin account script.
//!
//! The script creates a login account named after the resolved credential
//! user, authorises the public key when one is known, sets the password for
//! password credentials, and grants passwordless sudo.

use shell_escape::unix::escape;

use crate::credentials::Credentials;

/// Renders the admin access script for `credentials`.
#[must_use]
pub fn admin_access_script(credentials: &Credentials) -> String {
    let user = escape(credentials.username().into());
    let home = escape(format!("/home/{}", credentials.username()).into());
    let sudoers_path = format!(
        "/etc/sudoers.d/90-flotilla-{}",
        sanitise(credentials.username())
    );
    let sudoers = escape(sudoers_path.into());
    let sudo_rule = escape(format!("{} ALL=(ALL) NOPASSWD:ALL", credentials.username()).into());

    let mut lines = vec![
        String::from("#!/bin/sh"),
        String::from("set -e"),
        format!("id -u {user} >/dev/null 2>&1 || useradd --create-home --shell /bin/bash {user}"),
    ];

    if let Some(public_key) = credentials.public_key() {
        let key = escape(public_key.into());
        lines.extend([
            format!("install -d -m 700 -o {user} -g {user} {home}/.ssh"),
            format!("printf '%s\\n' {key} >> {home}/.ssh/authorized_keys"),
            format!("chown {user}:{user} {home}/.ssh/authorized_keys"),
            format!("chmod 600 {home}/.ssh/authorized_keys"),
        ]);
    }

    if let Some(password) = credentials.password() {
        let entry = escape(format!("{}:{password}", credentials.username()).into());
        lines.push(format!("printf '%s\\n' {entry} | chpasswd"));
    }

    lines.extend([
        format!("printf '%s\\n' {sudo_rule} > {sudoers}"),
        format!("chmod 440 {sudoers}"),
    ]);

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

fn sanitise(user: &str) -> String {
    user.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}
