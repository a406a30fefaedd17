//! POSIX shell rendering of a bootstrap machine.
//!
//! The script is a `case` loop over state ids. Every run step first removes
//! any instance carrying the application identity, so re-running the whole
//! script replaces the application rather than starting a second copy. All
//! output is appended to the bootstrap log.

use super::machine::BootstrapMachine;
use super::state::{Action, BootstrapState, BootstrapStep, CommandMode, ImageSource, Precondition, SuccessCheck};
use super::{
    env_file_path, unit_file_path, ENV_HEREDOC, LOG_DIR, LOG_FILE, STATE_DIR, STATE_FILE,
    UNIT_HEREDOC,
};
use crate::domain::{DeploymentPlan, Result, RuntimeFamily};
use crate::render::envfile::{render_env_file, EnvFileReader};
use crate::render::escape::{heredoc_body, shell_word};
use crate::render::systemd::{render_unit, ServiceUnit};

/// Artifact name of the bootstrap script.
pub const SCRIPT_ARTIFACT: &str = "startup.sh";

const DEFAULT_NODE_MAJOR: u32 = 20;

const HELPERS: &str = r#"log() {
  echo "$(date -u +%Y-%m-%dT%H:%M:%SZ) [autodeploy] $*"
}

record_state() {
  echo "$1" >"$STATE_FILE.tmp" && mv "$STATE_FILE.tmp" "$STATE_FILE"
}

advance() {
  log "$state -> $1 ($2)"
  state=$1
  record_state "$state"
}

apt_install() {
  if command -v apt-get >/dev/null 2>&1; then
    DEBIAN_FRONTEND=noninteractive apt-get update -y >/dev/null 2>&1 || true
    DEBIAN_FRONTEND=noninteractive apt-get install -y "$@"
  elif command -v dnf >/dev/null 2>&1; then
    dnf install -y "$@"
  elif command -v yum >/dev/null 2>&1; then
    yum install -y "$@"
  else
    log "no supported package manager for: $*"
    return 1
  fi
}

ensure_tool() {
  tool=$1
  shift
  command -v "$tool" >/dev/null 2>&1 && return 0
  log "installing $*"
  apt_install "$@"
}

ensure_base_tools() {
  ensure_tool git git && ensure_tool curl curl ca-certificates
}

ensure_docker() {
  if ! command -v docker >/dev/null 2>&1; then
    log "installing container engine"
    apt_install docker.io || return 1
  fi
  systemctl enable --now docker >/dev/null 2>&1 || service docker start >/dev/null 2>&1 || true
  docker info >/dev/null 2>&1
}

host_arch() {
  case "$(uname -m)" in
    x86_64 | amd64) echo amd64 ;;
    aarch64 | arm64) echo arm64 ;;
    *) uname -m ;;
  esac
}

alternate_arch() {
  if [ "$(host_arch)" = arm64 ]; then echo amd64; else echo arm64; fi
}

stop_existing() {
  log "removing previous instances of $APP_NAME"
  if command -v docker >/dev/null 2>&1; then
    docker rm -f "$APP_NAME" >/dev/null 2>&1 || true
  fi
  if [ -f "$UNIT_FILE" ]; then
    systemctl stop "$APP_NAME.service" >/dev/null 2>&1 || true
    systemctl disable "$APP_NAME.service" >/dev/null 2>&1 || true
    rm -f "$UNIT_FILE"
    systemctl daemon-reload >/dev/null 2>&1 || true
  fi
}

port_open() {
  curl -s -o /dev/null --max-time 2 "http://127.0.0.1:$APP_PORT/"
}

image_present() {
  docker image inspect "$1" >/dev/null 2>&1
}

source_present() {
  [ -d "$APP_DIR/.git" ]
}

container_alive() {
  [ "$(docker inspect -f '{{.State.Running}}' "$APP_NAME" 2>/dev/null)" = true ]
}

service_alive() {
  systemctl is-active --quiet "$APP_NAME.service"
}

# Succeeds once the port answers, fails as soon as the instance dies, and
# accepts an instance that is still alive after the last attempt.
wait_healthy() {
  probe=$1
  i=0
  while [ "$i" -lt "$HEALTH_ATTEMPTS" ]; do
    sleep "$HEALTH_INTERVAL"
    "$probe" || return 1
    port_open && return 0
    i=$((i + 1))
  done
  "$probe" || return 1
  log "warning: $APP_NAME is alive but port $APP_PORT never answered"
}

run_container() {
  image=$1
  platform=$2
  mode=$3
  stop_existing
  set -- -d --name "$APP_NAME" --restart unless-stopped --env-file "$ENV_FILE" -p "$APP_PORT:$APP_PORT"
  if [ -n "$platform" ]; then
    set -- "$@" --platform "$platform"
  fi
  if [ "$mode" = explicit ]; then
    set -- "$@" --entrypoint /bin/sh "$image" -c "$START_COMMAND"
  else
    set -- "$@" "$image"
  fi
  log "starting $image ($mode command)"
  docker run "$@" >/dev/null || return 1
  wait_healthy container_alive
}

activate_unit() {
  systemctl daemon-reload || return 1
  systemctl enable "$APP_NAME.service" >/dev/null 2>&1 || return 1
  systemctl restart "$APP_NAME.service" || return 1
  wait_healthy service_alive
}

forward_port_80() {
  [ "$APP_PORT" = 80 ] && return 0
  command -v iptables >/dev/null 2>&1 || apt_install iptables >/dev/null 2>&1 || return 0
  iptables -t nat -C PREROUTING -p tcp --dport 80 -j REDIRECT --to-ports "$APP_PORT" 2>/dev/null ||
    iptables -t nat -A PREROUTING -p tcp --dport 80 -j REDIRECT --to-ports "$APP_PORT" ||
    log "port 80 forwarding unavailable"
}
"#;

const CLONE_BODY: &str = r#"  ensure_base_tools || return 1
  if [ -d "$APP_DIR/.git" ]; then
    log "updating checkout in $APP_DIR"
    git -C "$APP_DIR" remote set-url origin "$REPO_URL" &&
      git -C "$APP_DIR" fetch --depth 1 origin "${GIT_REF:-HEAD}" &&
      git -C "$APP_DIR" reset --hard FETCH_HEAD
  else
    log "cloning $REPO_URL into $APP_DIR"
    rm -rf "$APP_DIR"
    mkdir -p "$(dirname "$APP_DIR")"
    if [ -n "$GIT_REF" ]; then
      git clone --depth 1 --branch "$GIT_REF" "$REPO_URL" "$APP_DIR" ||
        { rm -rf "$APP_DIR" && git clone "$REPO_URL" "$APP_DIR" && git -C "$APP_DIR" checkout "$GIT_REF"; }
    else
      git clone --depth 1 "$REPO_URL" "$APP_DIR"
    fi
  fi
"#;

/// Major version for the NodeSource installer.
fn node_major(version: Option<&str>) -> u32 {
    version
        .and_then(|v| {
            let digits: String = v
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u32>().ok()
        })
        .filter(|major| (14..=30).contains(major))
        .unwrap_or(DEFAULT_NODE_MAJOR)
}

fn step_fn(state: BootstrapState) -> String {
    format!("step_{}", state.id().to_lowercase())
}

fn precondition_fn(pre: Precondition) -> Option<String> {
    match pre {
        Precondition::Always => None,
        Precondition::NoNativeManifest => Some("no_native_manifest".to_string()),
        Precondition::BuildDescriptorPresent => Some("has_build_descriptor".to_string()),
        Precondition::MarkerFilePresent(rt) => Some(format!("has_{}_markers", rt.name())),
    }
}

fn check_call(step: &BootstrapStep) -> &'static str {
    match (step.success_check, step.action) {
        (SuccessCheck::ImagePresent, Action::BuildImage) => "image_present \"$LOCAL_IMAGE\"",
        (SuccessCheck::ImagePresent, _) => "image_present \"$IMAGE_REF\"",
        (SuccessCheck::SourcePresent, _) => "source_present",
        (SuccessCheck::ContainerAlive, _) => "container_alive",
        (SuccessCheck::ServiceAlive, _) => "service_alive",
    }
}

fn install_body(rt: RuntimeFamily) -> &'static str {
    match rt {
        RuntimeFamily::Python => {
            r#"  ensure_tool python3 python3 || return 1
  apt_install python3-venv python3-pip >/dev/null 2>&1 || true
  cd "$APP_DIR" || return 1
  python3 -m venv .venv || return 1
  .venv/bin/pip install --upgrade pip >/dev/null 2>&1 || true
  if [ -f requirements.txt ]; then
    .venv/bin/pip install -r requirements.txt || return 1
  elif [ -f pyproject.toml ] || [ -f setup.py ]; then
    .venv/bin/pip install . || return 1
  fi
"#
        }
        RuntimeFamily::Node => {
            r#"  if ! command -v node >/dev/null 2>&1; then
    ensure_base_tools || return 1
    curl -fsSL "https://deb.nodesource.com/setup_$NODE_MAJOR.x" | bash - || return 1
    apt_install nodejs || return 1
  fi
  cd "$APP_DIR" || return 1
  if [ -f package-lock.json ]; then
    npm ci || npm install || return 1
  else
    npm install || return 1
  fi
"#
        }
        RuntimeFamily::Go => {
            r#"  ensure_tool go golang-go || return 1
  cd "$APP_DIR" || return 1
  go mod download >/dev/null 2>&1 || true
"#
        }
        RuntimeFamily::Ruby => {
            r#"  ensure_tool ruby ruby-full build-essential || return 1
  command -v bundle >/dev/null 2>&1 || gem install bundler || return 1
  cd "$APP_DIR" || return 1
  bundle install || return 1
"#
        }
        RuntimeFamily::Java | RuntimeFamily::Rust => "  return 1\n",
    }
}

/// Renders a [`BootstrapMachine`] for one plan.
pub struct ScriptSynthesizer<'a> {
    plan: &'a DeploymentPlan,
    machine: &'a BootstrapMachine,
    app_dir: &'a str,
}

impl<'a> ScriptSynthesizer<'a> {
    pub fn new(plan: &'a DeploymentPlan, machine: &'a BootstrapMachine, app_dir: &'a str) -> Self {
        Self {
            plan,
            machine,
            app_dir,
        }
    }

    fn word(&self, field: &str, value: &str) -> Result<String> {
        shell_word(SCRIPT_ARTIFACT, field, value)
    }

    pub fn render(&self) -> Result<String> {
        let plan = self.plan;
        let mut out = String::new();

        out.push_str("#!/bin/sh\n");
        out.push_str(&format!("# autodeploy bootstrap for {}\n", plan.app_name));
        out.push_str("# States: ");
        let ids: Vec<String> = self.machine.steps().iter().map(|s| s.id.id()).collect();
        out.push_str(&ids.join(" "));
        out.push_str("\n# Safe to re-run: each run step replaces the previous instance.\nset -u\n\n");

        self.push_variables(&mut out)?;
        out.push_str(&format!(
            "mkdir -p {} {} \"$(dirname \"$ENV_FILE\")\"\nexec >>{} 2>&1\n\n",
            LOG_DIR, STATE_DIR, LOG_FILE
        ));
        out.push_str(HELPERS);
        out.push('\n');
        self.push_preconditions(&mut out);
        for step in self.machine.steps() {
            self.push_step_fn(&mut out, step)?;
        }

        out.push_str("log \"bootstrap starting for $APP_NAME\"\n");
        let env = render_env_file(plan, EnvFileReader::for_plan(plan))?;
        heredoc_body(SCRIPT_ARTIFACT, "env_lines", &env, ENV_HEREDOC)?;
        out.push_str(&format!(
            "umask 077\ncat >\"$ENV_FILE\" <<'{delim}'\n{env}{delim}\numask 022\n",
            delim = ENV_HEREDOC,
            env = env
        ));
        out.push_str("forward_port_80\n\n");

        self.push_driver(&mut out);
        Ok(out)
    }

    fn push_variables(&self, out: &mut String) -> Result<()> {
        let plan = self.plan;
        let app_port = plan.app_port.to_string();
        let local_image = format!("{}:local", plan.app_name);
        let node_major = node_major(plan.language_version.as_deref()).to_string();
        let env_file = env_file_path(&plan.app_name);
        let unit_file = unit_file_path(&plan.app_name);
        let vars: [(&str, &str); 12] = [
            ("APP_NAME", plan.app_name.as_str()),
            ("APP_PORT", app_port.as_str()),
            ("APP_DIR", self.app_dir),
            ("REPO_URL", plan.repo_url.as_str()),
            ("GIT_REF", plan.git_ref.as_deref().unwrap_or("")),
            ("IMAGE_REF", plan.image_reference.as_deref().unwrap_or("")),
            ("START_COMMAND", plan.start_command.as_str()),
            ("LOCAL_IMAGE", local_image.as_str()),
            ("NODE_MAJOR", node_major.as_str()),
            ("ENV_FILE", env_file.as_str()),
            ("UNIT_FILE", unit_file.as_str()),
            ("STATE_FILE", STATE_FILE),
        ];
        for (name, value) in vars {
            out.push_str(&format!("{}={}\n", name, self.word(name, value)?));
        }
        out.push_str("HEALTH_ATTEMPTS=30\nHEALTH_INTERVAL=2\nPULLED_PLATFORM=\n\n");
        Ok(())
    }

    fn push_preconditions(&self, out: &mut String) {
        let mut emitted: Vec<String> = Vec::new();
        for step in self.machine.steps() {
            let Some(name) = precondition_fn(step.precondition) else {
                continue;
            };
            if emitted.contains(&name) {
                continue;
            }
            let body = match step.precondition {
                Precondition::NoNativeManifest => {
                    "  ! docker manifest inspect \"$IMAGE_REF\" 2>/dev/null | grep -q \"\\\"architecture\\\": *\\\"$(host_arch)\\\"\"\n".to_string()
                }
                Precondition::BuildDescriptorPresent => {
                    "  [ -f \"$APP_DIR/Dockerfile\" ] || [ -f \"$APP_DIR/dockerfile\" ]\n".to_string()
                }
                Precondition::MarkerFilePresent(rt) => {
                    let tests: Vec<String> = rt
                        .marker_files()
                        .iter()
                        .map(|f| format!("[ -f \"$APP_DIR/{}\" ]", f))
                        .collect();
                    format!("  {}\n", tests.join(" || "))
                }
                Precondition::Always => continue,
            };
            out.push_str(&format!("{}() {{\n{}}}\n\n", name, body));
            emitted.push(name);
        }
    }

    fn push_step_fn(&self, out: &mut String, step: &BootstrapStep) -> Result<()> {
        let body = match step.action {
            Action::PullImage => "  ensure_docker || return 1\n  PULLED_PLATFORM=\"linux/$(host_arch)\"\n  log \"pulling $IMAGE_REF for $PULLED_PLATFORM\"\n  docker pull --platform \"$PULLED_PLATFORM\" \"$IMAGE_REF\"\n".to_string(),
            Action::EnableEmulationAndPull => "  ensure_docker || return 1\n  alt=$(alternate_arch)\n  log \"enabling $alt emulation\"\n  docker run --privileged --rm tonistiigi/binfmt --install \"$alt\" >/dev/null || return 1\n  PULLED_PLATFORM=\"linux/$alt\"\n  docker pull --platform \"$PULLED_PLATFORM\" \"$IMAGE_REF\"\n".to_string(),
            Action::RunContainer { image, mode } => {
                let (image, platform) = match image {
                    ImageSource::Pulled => ("\"$IMAGE_REF\"", "\"$PULLED_PLATFORM\""),
                    ImageSource::Local => ("\"$LOCAL_IMAGE\"", "\"\""),
                };
                let mode = match mode {
                    CommandMode::Explicit => "explicit",
                    CommandMode::Default => "default",
                };
                format!("  ensure_docker || return 1\n  run_container {} {} {}\n", image, platform, mode)
            }
            Action::CloneSource => CLONE_BODY.to_string(),
            Action::BuildImage => "  ensure_docker || return 1\n  log \"building $LOCAL_IMAGE\"\n  docker build -t \"$LOCAL_IMAGE\" \"$APP_DIR\"\n".to_string(),
            Action::InstallAndServe { runtime } => self.native_body(runtime)?,
        };
        out.push_str(&format!("{}() {{\n{}}}\n\n", step_fn(step.id), body));
        Ok(())
    }

    fn native_body(&self, rt: RuntimeFamily) -> Result<String> {
        let command = if self.plan.runtime() == Some(rt) {
            self.plan.start_command.clone()
        } else {
            rt.default_start_command().to_string()
        };
        let venv_bin = format!("{}/.venv/bin", self.app_dir.trim_end_matches('/'));
        let env_file = env_file_path(&self.plan.app_name);
        let unit = render_unit(&ServiceUnit {
            app_name: &self.plan.app_name,
            working_dir: self.app_dir,
            env_file: &env_file,
            command: &command,
            path_prefix: (rt == RuntimeFamily::Python).then_some(venv_bin.as_str()),
        })?;
        heredoc_body(SCRIPT_ARTIFACT, "service unit", &unit, UNIT_HEREDOC)?;

        let mut body = String::from("  stop_existing\n");
        body.push_str(&format!("  log \"installing {} runtime\"\n", rt.name()));
        body.push_str(install_body(rt));
        body.push_str(&format!(
            "  cat >\"$UNIT_FILE\" <<'{delim}'\n{unit}{delim}\n  activate_unit\n",
            delim = UNIT_HEREDOC,
            unit = unit
        ));
        Ok(body)
    }

    fn push_driver(&self, out: &mut String) {
        let entry = self.machine.entry();
        out.push_str(&format!("state={}\nrecord_state \"$state\"\n", entry.id()));
        out.push_str("while :; do\n  case \"$state\" in\n");
        for step in self.machine.steps() {
            out.push_str(&format!("    {})\n", step.id.id()));
            let run = format!("{} && {}", step_fn(step.id), check_call(step));
            match precondition_fn(step.precondition) {
                Some(pre) => {
                    out.push_str(&format!(
                        "      if ! {}; then\n        advance {} skipped\n      elif {}; then\n",
                        pre,
                        step.next_on_failure.id(),
                        run
                    ));
                }
                None => out.push_str(&format!("      if {}; then\n", run)),
            }
            out.push_str(&format!(
                "        advance {} succeeded\n      else\n        advance {} failed\n      fi\n      ;;\n",
                step.next_on_success.id(),
                step.next_on_failure.id()
            ));
        }
        out.push_str(
            "    RUNNING)\n      log \"$APP_NAME is running on port $APP_PORT\"\n      exit 0\n      ;;\n",
        );
        out.push_str(
            "    FAILED)\n      log \"all strategies exhausted for $APP_NAME\"\n      exit 1\n      ;;\n",
        );
        out.push_str(
            "    *)\n      log \"unknown state $state\"\n      record_state FAILED\n      exit 1\n      ;;\n",
        );
        out.push_str("  esac\ndone\n");
    }
}

/// Render the bootstrap script for `plan`.
pub fn synthesize_script(
    plan: &DeploymentPlan,
    machine: &BootstrapMachine,
    app_dir: &str,
) -> Result<String> {
    ScriptSynthesizer::new(plan, machine, app_dir).render()
}
