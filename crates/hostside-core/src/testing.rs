//! Scripted in-memory device for tests.
//!
//! [`FakeDevice`] implements [`CommandChannel`] by interpreting the same
//! shell commands a real device receives: users, packages, settings, lock
//! credentials, feature flags and instrumentation runs. Clones share state,
//! so a test keeps one handle for inspection and gives another to the code
//! under test.
//!
//! ```ignore
//! let fake = FakeDevice::new()
//!     .with_apk("Admin.apk", "com.example.admin")
//!     .with_procedure(
//!         "com.example.admin",
//!         "com.example.admin.PolicyTest#testSet",
//!         ProcedureScript::pass().emit(Event::new("SET_POLICY")),
//!     );
//! let channel: Arc<dyn CommandChannel> = Arc::new(fake.clone());
//! ```

use crate::channel::CommandChannel;
use crate::error::{HostError, Result};
use crate::event::Event;
use crate::settings::Namespace;
use async_trait::async_trait;
use hostside_constants::instrumentation as raw;
use hostside_constants::markers;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const OWNER_FLAGS: u32 = 0xc13;
const SECONDARY_FLAGS: u32 = 0x400;
const GUEST_FLAGS: u32 = markers::FLAG_GUEST | 0x400;
const PROFILE_FLAGS: u32 = markers::FLAG_MANAGED_PROFILE | 0x1010;

/// What a scripted test method does when run.
#[derive(Debug, Clone)]
pub struct ProcedureScript {
    outcome: ScriptOutcome,
    events: Vec<Event>,
    required: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum ScriptOutcome {
    Pass,
    Fail(String),
    Crash,
    Raw(String),
}

impl ProcedureScript {
    /// A test that passes.
    #[must_use]
    pub fn pass() -> Self {
        Self::with_outcome(ScriptOutcome::Pass)
    }

    /// A test that fails with `message` as the first stack line.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::with_outcome(ScriptOutcome::Fail(message.into()))
    }

    /// A test whose process dies mid-run.
    #[must_use]
    pub fn crash() -> Self {
        Self::with_outcome(ScriptOutcome::Crash)
    }

    /// Replies with `output` verbatim instead of a rendered stream.
    #[must_use]
    pub fn raw(output: impl Into<String>) -> Self {
        Self::with_outcome(ScriptOutcome::Raw(output.into()))
    }

    /// Emits `event` while running.
    #[must_use]
    pub fn emit(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Fails unless the instrumentation argument `name` equals `value`.
    #[must_use]
    pub fn require_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.required.push((name.into(), value.into()));
        self
    }

    fn with_outcome(outcome: ScriptOutcome) -> Self {
        Self {
            outcome,
            events: Vec::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct FakeUser {
    name: String,
    flags: u32,
    serial: u32,
    running: bool,
}

#[derive(Debug, Clone)]
struct Script {
    package: String,
    class: String,
    method: String,
    script: ProcedureScript,
}

#[derive(Debug)]
struct State {
    users: BTreeMap<u32, FakeUser>,
    next_id: u32,
    next_serial: u32,
    max_users: u32,
    api_level: u32,
    features: BTreeSet<String>,
    screen: (u32, u32),
    settings: BTreeMap<(Namespace, String, Option<u32>), String>,
    protected_settings: BTreeSet<(Namespace, String)>,
    credentials: BTreeMap<u32, String>,
    apks: BTreeMap<String, String>,
    files: BTreeMap<String, String>,
    installed: BTreeSet<(u32, String)>,
    scripts: Vec<Script>,
    commands: Vec<String>,
    failing: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        let mut users = BTreeMap::new();
        users.insert(
            0,
            FakeUser {
                name: "Owner".to_string(),
                flags: OWNER_FLAGS,
                serial: 0,
                running: true,
            },
        );
        Self {
            users,
            next_id: 10,
            next_serial: 10,
            max_users: 4,
            api_level: 33,
            features: BTreeSet::new(),
            screen: (1080, 2340),
            settings: BTreeMap::new(),
            protected_settings: BTreeSet::new(),
            credentials: BTreeMap::new(),
            apks: BTreeMap::new(),
            files: BTreeMap::new(),
            installed: BTreeSet::new(),
            scripts: Vec::new(),
            commands: Vec::new(),
            failing: Vec::new(),
        }
    }
}

/// In-memory device with user 0 as the running primary user.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<State>>,
}

impl FakeDevice {
    /// Creates a device supporting four users, API level 33 and no
    /// optional features.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `pm get-max-users`.
    #[must_use]
    pub fn with_max_users(self, max: u32) -> Self {
        self.state().max_users = max;
        self
    }

    /// Advertises a feature in `pm list features`.
    #[must_use]
    pub fn with_feature(self, feature: &str) -> Self {
        self.state().features.insert(feature.to_string());
        self
    }

    /// Sets `ro.build.version.sdk`.
    #[must_use]
    pub fn with_api_level(self, level: u32) -> Self {
        self.state().api_level = level;
        self
    }

    /// Sets the physical display size.
    #[must_use]
    pub fn with_screen_size(self, width: u32, height: u32) -> Self {
        self.state().screen = (width, height);
        self
    }

    /// Presets a setting.
    #[must_use]
    pub fn with_setting(self, namespace: Namespace, key: &str, user: Option<u32>, value: &str) -> Self {
        self.state()
            .settings
            .insert(setting_key(namespace, key, user), value.to_string());
        self
    }

    /// Makes writes to `key` fail the way the provider refuses a write
    /// without `WRITE_SECURE_SETTINGS`.
    #[must_use]
    pub fn with_protected_setting(self, namespace: Namespace, key: &str) -> Self {
        self.state()
            .protected_settings
            .insert((namespace, key.to_string()));
        self
    }

    /// Registers an APK file name and the package it installs. Files not
    /// registered are rejected by `pm install`.
    #[must_use]
    pub fn with_apk(self, file_name: &str, package: &str) -> Self {
        self.state()
            .apks
            .insert(file_name.to_string(), package.to_string());
        self
    }

    /// Marks `package` installed for `user` without going through a push.
    #[must_use]
    pub fn with_installed(self, user: u32, package: &str) -> Self {
        self.state().installed.insert((user, package.to_string()));
        self
    }

    /// Scripts the test method `test` (`Class#method`) of `package`,
    /// replacing any earlier script for the same method.
    #[must_use]
    pub fn with_procedure(
        self,
        package: impl Into<String>,
        test: impl Into<String>,
        script: ProcedureScript,
    ) -> Self {
        let test = test.into();
        let (class, method) = match test.split_once('#') {
            Some((class, method)) => (class.to_string(), method.to_string()),
            None => (test, "test".to_string()),
        };
        let package = package.into();
        let mut state = self.state();
        state
            .scripts
            .retain(|s| !(s.package == package && s.class == class && s.method == method));
        state.scripts.push(Script {
            package,
            class,
            method,
            script,
        });
        drop(state);
        self
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Makes every command starting with `prefix` fail with a transport
    /// error. Pushes are matched as `push <remote>`.
    pub fn fail_commands(&self, prefix: &str) {
        self.state().failing.push(prefix.to_string());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Returns true if the user exists.
    pub fn user_exists(&self, id: u32) -> bool {
        self.state().users.contains_key(&id)
    }

    /// Returns true if the user exists and is running.
    pub fn user_running(&self, id: u32) -> bool {
        self.state().users.get(&id).is_some_and(|u| u.running)
    }

    /// Ids of all users, ascending.
    pub fn user_ids(&self) -> Vec<u32> {
        self.state().users.keys().copied().collect()
    }

    /// Deletes a user behind the host's back.
    pub fn delete_user(&self, id: u32) {
        self.state().drop_user(id);
    }

    /// Returns true if `package` is installed for `user`.
    pub fn is_installed(&self, user: u32, package: &str) -> bool {
        self.state().installed.contains(&(user, package.to_string()))
    }

    /// Current value of a setting.
    pub fn setting(&self, namespace: Namespace, key: &str, user: Option<u32>) -> Option<String> {
        self.state()
            .settings
            .get(&setting_key(namespace, key, user))
            .cloned()
    }

    /// Sets the lock screen credential of `user`.
    pub fn set_lock_credential(&self, user: u32, credential: &str) {
        self.state()
            .credentials
            .insert(user, credential.to_string());
    }

    /// Returns true if a file was pushed to `remote` and not deleted.
    pub fn file_exists(&self, remote: &str) -> bool {
        self.state().files.contains_key(remote)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CommandChannel for FakeDevice {
    async fn execute(&self, command: &str) -> Result<String> {
        let mut state = self.state();
        state.commands.push(command.to_string());
        if state.fails(command) {
            return Err(HostError::transport(format!("injected failure: {command}")));
        }
        let words = split_words(command);
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        Ok(state.dispatch(command, &words))
    }

    async fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let mut state = self.state();
        if state.fails(&format!("push {remote}")) {
            return Err(HostError::transport(format!("injected failure: push {remote}")));
        }
        if !local.is_file() {
            return Err(HostError::transport(format!(
                "adb: error: cannot stat '{}': No such file or directory",
                local.display()
            )));
        }
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        state.files.insert(remote.to_string(), file_name);
        Ok(())
    }
}

impl State {
    fn fails(&self, command: &str) -> bool {
        self.failing.iter().any(|prefix| command.starts_with(prefix.as_str()))
    }

    fn drop_user(&mut self, id: u32) {
        self.users.remove(&id);
        self.installed.retain(|(user, _)| *user != id);
        self.settings.retain(|(_, _, user), _| *user != Some(id));
        self.credentials.remove(&id);
    }

    fn dispatch(&mut self, command: &str, words: &[&str]) -> String {
        match words {
            ["pm", "get-max-users"] => format!("Maximum supported users: {}\n", self.max_users),
            ["pm", "list", "features"] => self
                .features
                .iter()
                .map(|f| format!("feature:{f}\n"))
                .collect(),
            ["pm", "list", "users"] => self.list_users(),
            ["pm", "list", "packages", "--user", user, rest @ ..] => {
                self.list_packages(parse_id(user), rest.first().copied())
            }
            ["pm", "create-user", args @ ..] => self.create_user(args),
            ["pm", "remove-user", id] => self.remove_user(parse_id(id)),
            ["pm", "install", args @ ..] => self.install(args),
            ["pm", "uninstall", "--user", user, package] => {
                self.uninstall(parse_id(user), package)
            }
            ["am", "get-current-user"] => "0\n".to_string(),
            ["am", "start-user", "-w", id] => self.start_user(parse_id(id)),
            ["am", "stop-user", "-w", "-f", id] => self.stop_user(parse_id(id)),
            ["am", "instrument", args @ ..] => self.instrument(args),
            ["dumpsys", "user"] => self.dumpsys_user(),
            ["getprop", "ro.build.version.sdk"] => format!("{}\n", self.api_level),
            ["wm", "size"] => format!("Physical size: {}x{}\n", self.screen.0, self.screen.1),
            ["rm", "-f", path] => {
                self.files.remove(*path);
                String::new()
            }
            ["cmd", "lock_settings", "verify", "--user", user, rest @ ..] => {
                self.verify_credential(parse_id(user), rest)
            }
            ["settings", "--user", user, rest @ ..] => self.settings(Some(parse_id(user)), rest),
            ["settings", rest @ ..] => self.settings(None, rest),
            _ => format!("/system/bin/sh: {command}: not found\n"),
        }
    }

    fn list_users(&self) -> String {
        let mut out = String::from("Users:\n");
        for (id, user) in &self.users {
            let running = if user.running { " running" } else { "" };
            let _ = writeln!(out, "\tUserInfo{{{id}:{}:{:x}}}{running}", user.name, user.flags);
        }
        out
    }

    fn dumpsys_user(&self) -> String {
        let mut out = String::from("Users:\n");
        for (id, user) in &self.users {
            let _ = writeln!(
                out,
                "  UserInfo{{{id}:{}:{:x}}} serialNo={} isPrimary={}",
                user.name,
                user.flags,
                user.serial,
                *id == 0
            );
        }
        out
    }

    fn create_user(&mut self, args: &[&str]) -> String {
        let (flags, name) = match args {
            ["--guest", name] => (GUEST_FLAGS, *name),
            ["--profileOf", parent, "--managed", name] => {
                if !self.users.contains_key(&parse_id(parent)) {
                    return format!("Error: couldn't create User. parent {parent} not found\n");
                }
                (PROFILE_FLAGS, *name)
            }
            [name] => (SECONDARY_FLAGS, *name),
            _ => return "Error: invalid create-user arguments\n".to_string(),
        };
        if self.users.len() >= self.max_users as usize {
            return "Error: couldn't create User.\n".to_string();
        }

        let id = self.next_id;
        self.next_id += 1;
        let serial = self.next_serial;
        self.next_serial += 1;
        self.users.insert(
            id,
            FakeUser {
                name: name.to_string(),
                flags,
                serial,
                running: false,
            },
        );
        format!("Success: created user id {id}\n")
    }

    fn start_user(&mut self, id: u32) -> String {
        match self.users.get_mut(&id) {
            Some(user) => {
                user.running = true;
                "Success: user started\n".to_string()
            }
            None => format!("Error: could not start user {id}\n"),
        }
    }

    fn stop_user(&mut self, id: u32) -> String {
        match self.users.get_mut(&id) {
            Some(user) if id != 0 => {
                user.running = false;
                String::new()
            }
            Some(_) => "Error: Can't stop current user: -2\n".to_string(),
            None => format!("Error: Can't stop user {id} - no such user\n"),
        }
    }

    fn remove_user(&mut self, id: u32) -> String {
        if id == 0 || !self.users.contains_key(&id) {
            return format!("Error: couldn't remove user id {id}\n");
        }
        self.drop_user(id);
        "Success: removed user\n".to_string()
    }

    fn install(&mut self, args: &[&str]) -> String {
        let mut user = 0;
        let mut path = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "--user" => user = iter.next().map_or(0, |u| parse_id(u)),
                flag if flag.starts_with('-') => {}
                other => path = Some(other),
            }
        }
        let Some(path) = path else {
            return "Error: no package specified\n".to_string();
        };
        if !self.users.contains_key(&user) {
            return format!("{} [{} {user}]\n", markers::FAILURE, markers::UNKNOWN_USER);
        }
        let Some(file_name) = self.files.get(path) else {
            return format!("{} [INSTALL_FAILED_INVALID_URI: {path}]\n", markers::FAILURE);
        };
        let Some(package) = self.apks.get(file_name).cloned() else {
            return format!(
                "{} [INSTALL_FAILED_INVALID_APK: cannot parse {file_name}]\n",
                markers::FAILURE
            );
        };
        self.installed.insert((user, package));
        "Success\n".to_string()
    }

    fn uninstall(&mut self, user: u32, package: &str) -> String {
        if self.installed.remove(&(user, package.to_string())) {
            "Success\n".to_string()
        } else {
            format!("{} [{} for {user}]\n", markers::FAILURE, markers::NOT_INSTALLED)
        }
    }

    fn list_packages(&self, user: u32, filter: Option<&str>) -> String {
        self.installed
            .iter()
            .filter(|(u, p)| *u == user && filter.is_none_or(|f| p.contains(f)))
            .map(|(_, p)| format!("package:{p}\n"))
            .collect()
    }

    fn verify_credential(&self, user: u32, rest: &[&str]) -> String {
        let given = match rest {
            ["--old", credential] => Some(*credential),
            _ => None,
        };
        match (self.credentials.get(&user), given) {
            (None, _) => format!("{}\n", markers::LOCK_VERIFIED),
            (Some(expected), Some(given)) if expected == given => {
                format!("{}\n", markers::LOCK_VERIFIED)
            }
            (Some(_), given) => format!(
                "Old password '{}' didn't match\n",
                given.unwrap_or_default()
            ),
        }
    }

    fn settings(&mut self, user: Option<u32>, rest: &[&str]) -> String {
        match rest {
            ["get", ns, key] => match ns.parse::<Namespace>().ok() {
                Some(ns) => self
                    .settings
                    .get(&setting_key(ns, key, user))
                    .map_or_else(|| format!("{}\n", hostside_constants::settings::NULL), |v| {
                        format!("{v}\n")
                    }),
                None => format!("Invalid namespace '{ns}'\n"),
            },
            [op @ ("put" | "delete"), ns, key, ..]
                if ns
                    .parse::<Namespace>()
                    .is_ok_and(|ns| self.protected_settings.contains(&(ns, (*key).to_string()))) =>
            {
                format!(
                    "{} '{op}':\njava.lang.SecurityException: Permission denial: writing to \
                     settings requires:android.permission.WRITE_SECURE_SETTINGS\n",
                    hostside_constants::settings::EXCEPTION
                )
            }
            ["put", ns, key, value] => match ns.parse::<Namespace>().ok() {
                Some(ns) => {
                    self.settings
                        .insert(setting_key(ns, key, user), (*value).to_string());
                    String::new()
                }
                None => format!("Invalid namespace '{ns}'\n"),
            },
            ["delete", ns, key] => match ns.parse::<Namespace>().ok() {
                Some(ns) => {
                    let removed = self.settings.remove(&setting_key(ns, key, user)).is_some();
                    format!("Deleted {} rows\n", u8::from(removed))
                }
                None => format!("Invalid namespace '{ns}'\n"),
            },
            _ => "usage: settings [--user <USER_ID>] get|put|delete NAMESPACE KEY [VALUE]\n"
                .to_string(),
        }
    }

    fn instrument(&self, args: &[&str]) -> String {
        let mut user = 0;
        let mut extras: Vec<(&str, &str)> = Vec::new();
        let mut component = "";
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "--user" => user = iter.next().map_or(0, |u| parse_id(u)),
                "-e" => {
                    if let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                        extras.push((*k, *v));
                    }
                }
                flag if flag.starts_with('-') => {}
                other => component = other,
            }
        }

        let package = component.split('/').next().unwrap_or_default();
        if !self.installed.contains(&(user, package.to_string())) {
            return format!(
                "{status}id=ActivityManagerService\n\
                 {status}Error={} for: ComponentInfo{{{component}}}\n\
                 {code}-1\n\
                 android.util.AndroidException: {failed}{component}\n",
                raw::NOT_FOUND,
                status = raw::STATUS,
                code = raw::STATUS_CODE,
                failed = raw::FAILED,
            );
        }

        let target = extras
            .iter()
            .find(|(k, _)| *k == raw::KEY_CLASS)
            .map(|(_, v)| *v)
            .unwrap_or_default();
        let (class, method) = match target.split_once('#') {
            Some((class, method)) => (class, Some(method)),
            None => (target, None),
        };
        let scripts: Vec<&Script> = self
            .scripts
            .iter()
            .filter(|s| s.package == package && s.class == class)
            .filter(|s| method.is_none_or(|m| s.method == m))
            .collect();

        if let [only] = scripts.as_slice() {
            if let ScriptOutcome::Raw(output) = &only.script.outcome {
                return output.clone();
            }
        }

        let mut out = String::new();
        for script in &scripts {
            if !render_test(&mut out, script, &extras) {
                let _ = write!(
                    out,
                    "{}{}=Process crashed.\n{}0\n",
                    raw::RESULT,
                    raw::KEY_SHORT_MSG,
                    raw::CODE
                );
                return out;
            }
        }
        let _ = write!(
            out,
            "{}{}=\n\nOK ({} tests)\n\n\n{}-1\n",
            raw::RESULT,
            raw::KEY_STREAM,
            scripts.len(),
            raw::CODE
        );
        out
    }
}

/// Appends one test's bundles. Returns false if the process "crashed".
fn render_test(out: &mut String, script: &Script, extras: &[(&str, &str)]) -> bool {
    let bundle = |out: &mut String, extra: Option<(&str, &str)>, code: i32| {
        let _ = writeln!(out, "{}{}={}", raw::STATUS, raw::KEY_CLASS, script.class);
        if let Some((key, value)) = extra {
            let _ = writeln!(out, "{}{key}={value}", raw::STATUS);
        }
        let _ = writeln!(out, "{}{}={}", raw::STATUS, raw::KEY_TEST, script.method);
        let _ = writeln!(out, "{}{code}", raw::STATUS_CODE);
    };

    bundle(out, None, raw::CODE_START);
    for event in &script.script.events {
        let _ = writeln!(out, "{}{}={}", raw::STATUS, raw::KEY_EVENT, event.to_json());
        let _ = writeln!(out, "{}{}", raw::STATUS_CODE, raw::CODE_EVENT);
    }

    let missing = script
        .script
        .required
        .iter()
        .find(|(k, v)| !extras.iter().any(|(ek, ev)| ek == k && ev == v));
    let failure = match (&script.script.outcome, missing) {
        (ScriptOutcome::Crash, _) => return false,
        (_, Some((k, v))) => Some(format!("java.lang.AssertionError: expected argument {k}={v}")),
        (ScriptOutcome::Fail(message), None) => Some(message.clone()),
        (ScriptOutcome::Pass | ScriptOutcome::Raw(_), None) => None,
    };

    match failure {
        Some(message) => {
            let stack = format!("{message}\n\tat {}.{}(Unknown Source)", script.class, script.method);
            bundle(out, Some((raw::KEY_STACK, stack.as_str())), raw::CODE_FAILURE);
        }
        None => bundle(out, None, raw::CODE_OK),
    }
    true
}

fn setting_key(namespace: Namespace, key: &str, user: Option<u32>) -> (Namespace, String, Option<u32>) {
    let user = match namespace {
        Namespace::Global => None,
        Namespace::System | Namespace::Secure => Some(user.unwrap_or(0)),
    };
    (namespace, key.to_string(), user)
}

fn parse_id(word: &str) -> u32 {
    word.parse().unwrap_or(u32::MAX)
}

/// Splits a command line the way the device shell would, honouring single
/// quotes and backslash escapes.
fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if !quoted => {
                if let Some(next) = chars.next() {
                    word.push(next);
                }
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(word);
    }
    words
}
