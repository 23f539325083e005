use anyhow::Result;
use box_pushing_core::{
    Action, BoxPushingEnv, Color as BoxColor, Config, Direction as Heading, Entity, EpisodeStatus,
    MoveEvent, Position,
    agent::{Agent, PlanningAgent, RandomWalker},
    layout::load_layout_from_string,
};
use clap::{Parser, ValueEnum};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Autoplay {
    Random,
    Planner,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Registered configuration, e.g. ColoredBoxPushing-12x12-v0 (overrides --size and --colored)
    #[arg(short, long)]
    preset: Option<String>,

    /// Side length of the square room, walls included
    #[arg(short, long, default_value_t = 8)]
    size: usize,

    /// Use four distinct box/goal colors
    #[arg(short, long)]
    colored: bool,

    /// Number of boxes that must reach a goal
    #[arg(short, long, default_value_t = 4)]
    required: u32,

    /// Step budget per delivery (defaults to 4 * size^2)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Seed for room generation
    #[arg(long)]
    seed: Option<u64>,

    /// Fixed layout file to play instead of generated rooms
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Agent that plays when autoplay is toggled with 'a'
    #[arg(long, value_enum, default_value_t = Autoplay::Planner)]
    autoplay: Autoplay,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

struct App {
    /// The core simulation environment.
    environment: BoxPushingEnv,
    /// Seed passed to every reset, if any.
    seed: Option<u64>,
    /// Agent driving the simulation while autoplay is on.
    autopilot: Box<dyn Agent>,
    autoplay: bool,
    last_event: Option<MoveEvent>,
    last_reward: f64,
    total_reward: f64,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let mut config = match &args.preset {
            Some(name) => Config::preset(name).map_err(|err| {
                anyhow::anyhow!("{err}; known presets: {}", Config::preset_names().join(", "))
            })?,
            None => Config::new(args.size).with_colored(args.colored),
        };
        config = config.with_required_boxes(args.required);
        if let Some(max_steps) = args.max_steps {
            config = config.with_max_steps(max_steps);
        }

        let mut environment = match (&args.map, args.seed) {
            (Some(map_file), _) => {
                let file_string = std::fs::read_to_string(map_file)?;
                let layout = load_layout_from_string(&file_string)?;
                BoxPushingEnv::with_layout(config, layout)?
            }
            (None, Some(seed)) => BoxPushingEnv::with_seed(config, seed)?,
            (None, None) => BoxPushingEnv::new(config)?,
        };
        environment.reset(args.seed)?;

        let autopilot: Box<dyn Agent> = match args.autoplay {
            Autoplay::Random => Box::new(RandomWalker::new(args.seed.unwrap_or(0))),
            Autoplay::Planner => Box::new(PlanningAgent::new()),
        };

        Ok(App {
            environment,
            seed: args.seed,
            autopilot,
            autoplay: false,
            last_event: None,
            last_reward: 0.0,
            total_reward: 0.0,
            should_quit: false,
        })
    }

    fn game_over(&self) -> bool {
        self.environment.status().is_done()
    }

    /// Applies one action unless the episode has already ended.
    fn act(&mut self, action: Action) -> Result<()> {
        if self.game_over() {
            return Ok(());
        }
        let result = self.environment.step(action)?;
        self.last_event = Some(result.event);
        self.last_reward = result.reward;
        self.total_reward += result.reward;
        Ok(())
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if !self.autoplay || self.game_over() {
            return Ok(());
        }
        let action = self.autopilot.get_action(&self.environment.view());
        self.act(action)
    }

    fn reset(&mut self) -> Result<()> {
        self.environment.reset(self.seed)?;
        self.last_event = None;
        self.last_reward = 0.0;
        self.total_reward = 0.0;
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Logging would corrupt the alternate screen, so it only goes to a file
    if let Some(path) = &args.log_file {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    if let Some(map_file) = &args.map {
        if !map_file.exists() {
            return Err(anyhow::anyhow!(
                "Map file does not exist: {}",
                map_file.display()
            ));
        }
    }

    // Create the application state before touching the terminal so errors print normally
    let mut app = App::new(&args)?;
    tracing::info!(config = ?app.environment.config(), "starting box pushing");

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop
    let outcome = run_app(&mut terminal, &mut app);

    // Restore the terminal state
    restore_terminal(&mut terminal)?;

    outcome
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(150);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Left => app.act(Action::TurnLeft)?,
                        KeyCode::Right => app.act(Action::TurnRight)?,
                        KeyCode::Up => app.act(Action::MoveForward)?,
                        KeyCode::Char('r') => app.reset()?,
                        KeyCode::Char('a') => app.autoplay = !app.autoplay,
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the map
            Constraint::Percentage(20), // Area for episode counters
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.environment);
    render_episode(frame, main_layout[1], app);

    let help_text = Paragraph::new(
        "←/→ turn  ↑ forward  'r' reset  'a' toggle autoplay  'q'/Esc quit",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn color_of(color: BoxColor) -> Color {
    match color {
        BoxColor::Red => Color::Red,
        BoxColor::Green => Color::Green,
        BoxColor::Blue => Color::Blue,
        BoxColor::Purple => Color::Magenta,
        BoxColor::Yellow => Color::Yellow,
        BoxColor::Grey => Color::DarkGray,
    }
}

/// Renders the episode counters onto the frame.
fn render_episode(frame: &mut Frame, area: Rect, app: &App) {
    let episode = app.environment.episode();
    let status = match episode.status {
        EpisodeStatus::Running => Span::raw("running"),
        EpisodeStatus::Terminated => {
            Span::styled("all boxes delivered", Style::default().fg(Color::Green).bold())
        }
        EpisodeStatus::Truncated => {
            Span::styled("out of steps", Style::default().fg(Color::Red).bold())
        }
    };
    let event = match app.last_event {
        Some(event) => format!("{event:?}"),
        None => "-".to_string(),
    };

    let items = vec![
        ListItem::from(Line::from(vec![Span::raw("Status: "), status])),
        ListItem::from(format!(
            "Boxes: {}/{}  Steps: {}/{}  Since last delivery: {}",
            episode.success_boxes_num,
            episode.required_boxes_num,
            episode.step_count,
            episode.step_limit(),
            episode.every_box_step_count
        )),
        ListItem::from(format!(
            "Reward: {:.3}  Total: {:.3}  Last event: {}",
            app.last_reward, app.total_reward, event
        )),
        ListItem::from(format!(
            "Autoplay: {}",
            if app.autoplay { "on" } else { "off" }
        )),
    ];

    let widget = List::new(items).block(Block::default().borders(Borders::ALL).title("Episode"));
    frame.render_widget(widget, area);
}

/// Renders the environment map onto the frame.
fn render_map(frame: &mut Frame, area: Rect, environment: &BoxPushingEnv) {
    let grid = environment.grid();
    let agent = environment.agent();

    let mut lines: Vec<Line> = Vec::with_capacity(grid.height());

    for y in 0..grid.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(grid.width());
        for x in 0..grid.width() {
            let pos = Position::new(x, y);
            if pos == agent.position {
                let arrow = match agent.direction {
                    Heading::Right => "▶ ",
                    Heading::Down => "▼ ",
                    Heading::Left => "◀ ",
                    Heading::Up => "▲ ",
                };
                spans.push(Span::styled(arrow, Style::default().fg(Color::Red).bold()));
                continue;
            }
            let span = match grid.get(pos).ok().copied().flatten() {
                None => Span::raw("  "),
                Some(Entity::Wall) => Span::styled("██", Style::default().fg(Color::DarkGray)),
                Some(Entity::Box {
                    color,
                    docked: false,
                }) => Span::styled("[]", Style::default().fg(color_of(color)).bold()),
                Some(Entity::Box {
                    color,
                    docked: true,
                }) => Span::styled("[]", Style::default().fg(Color::Black).bg(color_of(color))),
                Some(Entity::Goal { color }) => {
                    Span::styled("()", Style::default().fg(color_of(color)))
                }
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Box Pushing").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
