use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tracker_core::*;

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Workout tracker: exercises, live sessions and progress stats", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage exercise categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Manage exercises
    Exercise {
        #[command(subcommand)]
        action: ExerciseAction,
    },

    /// Browse and manage recorded workouts
    Workout {
        #[command(subcommand)]
        action: WorkoutAction,
    },

    /// Run a workout session driven by commands on stdin
    Session {
        /// Continue editing an existing workout
        #[arg(long, conflicts_with = "plan")]
        resume: Option<i64>,

        /// Start from the structure of a past workout
        #[arg(long)]
        plan: Option<i64>,
    },

    /// Overview statistics, or progress for one exercise
    Stats {
        #[arg(long)]
        exercise: Option<i64>,

        /// Series to print with --exercise (weight, volume, reps, sets)
        #[arg(long, default_value = "weight")]
        metric: String,
    },

    /// Personal records per exercise
    Records,

    /// Every set ever recorded for an exercise
    History { exercise_id: i64 },

    /// Export all data
    Export {
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },

    /// Replace all data with a JSON export
    Import { path: PathBuf },

    /// Show or change preferences
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum CategoryAction {
    List,
    Add { name: String },
    Rename { id: i64, name: String },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum ExerciseAction {
    List {
        /// Only exercises in this category
        #[arg(long)]
        category: Option<i64>,

        /// Include deleted exercises
        #[arg(long, conflicts_with = "category")]
        all: bool,
    },
    Add {
        title: String,

        #[arg(long)]
        category: Option<i64>,

        #[arg(long, default_value = "")]
        notes: String,

        /// Bodyweight exercise without a load
        #[arg(long)]
        no_weight: bool,
    },
    Edit {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long, conflicts_with = "no_category")]
        category: Option<i64>,

        #[arg(long)]
        no_category: bool,

        #[arg(long)]
        has_weight: Option<bool>,
    },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum WorkoutAction {
    List,
    Show { id: i64 },
    Delete { id: i64 },
    /// Save a pending draft as an unfinished workout
    Recover,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    /// Keys: theme, dynamic-colors, unit, rest-timer, weekly-goal, streak
    Set { key: String, value: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

/// Everything a command needs, opened from the data directory
struct Context {
    config: Config,
    db: Database,
    settings: SettingsRepository,
    drafts: DraftStore,
}

impl Context {
    fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::load()?;
        if let Some(dir) = data_dir {
            config.data.data_dir = dir;
        }
        std::fs::create_dir_all(&config.data.data_dir)?;
        tracing::debug!("Using data directory {:?}", config.data.data_dir);

        let db = Database::open(&config.data.database_path())?;
        let settings = SettingsRepository::new(config.data.settings_path());
        let drafts = DraftStore::new(config.data.draft_path());
        Ok(Self {
            config,
            db,
            settings,
            drafts,
        })
    }

    fn unit(&self) -> WeightUnit {
        self.settings.weight_unit()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracker_core::logging::init_with_level("warn");

    let cli = Cli::parse();
    let ctx = Context::open(cli.data_dir)?;

    match cli.command {
        Commands::Category { action } => cmd_category(&ctx, action),
        Commands::Exercise { action } => cmd_exercise(&ctx, action),
        Commands::Workout { action } => cmd_workout(&ctx, action),
        Commands::Session { resume, plan } => {
            let origin = match (resume, plan) {
                (Some(id), _) => SessionOrigin::Resume(id),
                (None, Some(id)) => SessionOrigin::Plan(id),
                (None, None) => SessionOrigin::Fresh,
            };
            cmd_session(&ctx, origin).await
        }
        Commands::Stats { exercise, metric } => cmd_stats(&ctx, exercise, &metric),
        Commands::Records => cmd_records(&ctx),
        Commands::History { exercise_id } => cmd_history(&ctx, exercise_id),
        Commands::Export { path, format } => cmd_export(&ctx, &path, format),
        Commands::Import { path } => cmd_import(&ctx, &path),
        Commands::Settings { action } => cmd_settings(&ctx, action),
    }
}

// ============================================================================
// Catalog
// ============================================================================

fn cmd_category(ctx: &Context, action: CategoryAction) -> Result<()> {
    let categories = CategoryRepository::new(ctx.db.clone());
    match action {
        CategoryAction::List => {
            for category in categories.list_all()? {
                println!("{:>4}  {}", category.id, category.name);
            }
        }
        CategoryAction::Add { name } => {
            let category = categories.insert(&name)?;
            println!("✓ Added category {} ({})", category.name, category.id);
        }
        CategoryAction::Rename { id, name } => {
            categories.update(&Category { id, name: name.clone() })?;
            println!("✓ Renamed category {} to {}", id, name);
        }
        CategoryAction::Delete { id } => {
            if !categories.delete(id)? {
                return Err(Error::NotFound {
                    entity: "category",
                    id,
                });
            }
            println!("✓ Deleted category {}", id);
        }
    }
    Ok(())
}

fn require_category(ctx: &Context, id: i64) -> Result<Category> {
    CategoryRepository::new(ctx.db.clone())
        .get_by_id(id)?
        .ok_or(Error::NotFound {
            entity: "category",
            id,
        })
}

fn require_exercise(ctx: &Context, id: i64) -> Result<Exercise> {
    ExerciseRepository::new(ctx.db.clone())
        .get_by_id(id)?
        .ok_or(Error::NotFound {
            entity: "exercise",
            id,
        })
}

fn display_exercise(exercise: &Exercise) {
    let category = exercise
        .category
        .as_ref()
        .map(|c| c.name.as_str())
        .unwrap_or("-");
    let mut flags = Vec::new();
    if !exercise.has_weight {
        flags.push("bodyweight");
    }
    if exercise.is_deleted {
        flags.push("deleted");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" ({})", flags.join(", "))
    };
    println!(
        "{:>4}  {:<28} {}{}",
        exercise.id, exercise.title, category, flags
    );
}

fn cmd_exercise(ctx: &Context, action: ExerciseAction) -> Result<()> {
    let exercises = ExerciseRepository::new(ctx.db.clone());
    match action {
        ExerciseAction::List { category, all } => {
            let list = match (category, all) {
                (Some(id), _) => exercises.list_by_category(id)?,
                (None, true) => exercises.list_all_including_deleted()?,
                (None, false) => exercises.list_active()?,
            };
            for exercise in &list {
                display_exercise(exercise);
            }
        }
        ExerciseAction::Add {
            title,
            category,
            notes,
            no_weight,
        } => {
            let exercise = exercises.insert(&NewExercise {
                title,
                notes,
                has_weight: !no_weight,
                category_id: category,
            })?;
            println!("✓ Added exercise {} ({})", exercise.title, exercise.id);
        }
        ExerciseAction::Edit {
            id,
            title,
            notes,
            category,
            no_category,
            has_weight,
        } => {
            let mut exercise = require_exercise(ctx, id)?;
            if let Some(title) = title {
                exercise.title = title;
            }
            if let Some(notes) = notes {
                exercise.notes = notes;
            }
            if let Some(category_id) = category {
                exercise.category = Some(require_category(ctx, category_id)?);
            }
            if no_category {
                exercise.category = None;
            }
            if let Some(has_weight) = has_weight {
                exercise.has_weight = has_weight;
            }
            exercises.update(&exercise)?;
            println!("✓ Updated exercise {}", id);
        }
        ExerciseAction::Delete { id } => {
            exercises.soft_delete(id)?;
            println!("✓ Deleted exercise {} (history is kept)", id);
        }
    }
    Ok(())
}

// ============================================================================
// Workouts
// ============================================================================

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

fn display_set(set: &WorkoutSet, unit: WeightUnit) {
    println!(
        "      {}. {} x {}",
        set.set_number,
        unit.format_weight(set.weight_kg),
        set.reps
    );
}

fn cmd_workout(ctx: &Context, action: WorkoutAction) -> Result<()> {
    let workouts = WorkoutRepository::new(ctx.db.clone());
    let unit = ctx.unit();
    match action {
        WorkoutAction::List => {
            for workout in workouts.list_all_with_exercises()? {
                println!(
                    "{:>4}  {}  {}  {} exercises, {} sets, {}{}",
                    workout.id,
                    local_time(workout.start_time),
                    format_duration(workout.duration_seconds.max(0) as u64),
                    workout.exercise_count(),
                    workout.total_sets(),
                    unit.format_weight(workout.total_volume()),
                    if workout.is_finished { "" } else { " (unfinished)" }
                );
            }
        }
        WorkoutAction::Show { id } => {
            let workout = workouts
                .get_by_id_with_exercises(id)?
                .ok_or(Error::NotFound {
                    entity: "workout",
                    id,
                })?;
            println!(
                "Workout {} on {} ({})",
                workout.id,
                local_time(workout.start_time),
                format_duration(workout.duration_seconds.max(0) as u64)
            );
            if !workout.is_finished {
                println!("  Not finished");
            }
            for we in &workout.exercises {
                println!("  {}. {}", we.order_index + 1, we.exercise.title);
                for set in &we.sets {
                    display_set(set, unit);
                }
            }
            println!("  Volume: {}", unit.format_weight(workout.total_volume()));
        }
        WorkoutAction::Delete { id } => {
            if !workouts.delete_by_id(id)? {
                return Err(Error::NotFound {
                    entity: "workout",
                    id,
                });
            }
            println!("✓ Deleted workout {}", id);
        }
        WorkoutAction::Recover => match ctx.drafts.resolve_draft_to_workout(&workouts)? {
            Some(id) => println!("✓ Recovered draft as unfinished workout {}", id),
            None => println!("No pending draft."),
        },
    }
    Ok(())
}

// ============================================================================
// Session
// ============================================================================

fn display_session(session: &SessionManager, unit: WeightUnit) {
    println!(
        "Session {:?}, elapsed {}",
        session.phase(),
        format_duration(session.elapsed().as_secs())
    );
    for entry in session.entries() {
        println!("  [{}] {}", entry.id, entry.exercise.title);
        if let Some(plan) = &entry.plan {
            if entry.is_ghost() {
                println!(
                    "      planned: {} sets, max {}",
                    plan.set_count,
                    unit.format_weight(plan.max_weight_kg)
                );
            }
        }
        for set in &entry.sets {
            display_set(set, unit);
        }
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T> {
    args.get(index)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| Error::Session(format!("Expected {} as argument {}", what, index)))
}

/// Outcome of one stdin command
enum Step {
    Continue,
    Done,
}

async fn session_step(
    ctx: &Context,
    session: &mut SessionManager,
    line: &str,
) -> Result<Step> {
    let unit = ctx.unit();
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(command) = args.first() else {
        return Ok(Step::Continue);
    };

    match *command {
        "start" => {
            session.start()?;
            println!("✓ Started");
        }
        "pause" => {
            session.toggle_pause()?;
            println!("✓ {:?}", session.phase());
        }
        "add" => {
            let exercise = require_exercise(ctx, parse_arg(&args, 1, "exercise id")?)?;
            let title = exercise.title.clone();
            let entry = session.add_exercise(exercise)?;
            println!("✓ Added {} as entry {}", title, entry);
        }
        "set" => {
            let entry = parse_arg(&args, 1, "entry id")?;
            let weight: f64 = parse_arg(&args, 2, "weight")?;
            let reps = parse_arg(&args, 3, "reps")?;
            let set = session.add_set(entry, unit.convert_to_kg(weight), reps)?;
            println!(
                "✓ Set {}: {} x {}",
                set.set_number,
                unit.format_weight(set.weight_kg),
                set.reps
            );
        }
        "rmset" => {
            let entry = parse_arg(&args, 1, "entry id")?;
            let number: usize = parse_arg(&args, 2, "set number")?;
            if number == 0 {
                return Err(Error::Session("Set numbers start at 1".into()));
            }
            session.remove_set(entry, number - 1)?;
            println!("✓ Removed set {}", number);
        }
        "rmex" => {
            let entry = parse_arg(&args, 1, "entry id")?;
            session.remove_exercise(entry)?;
            println!("✓ Removed entry {}", entry);
        }
        "swap" => {
            let entry = parse_arg(&args, 1, "entry id")?;
            let exercise = require_exercise(ctx, parse_arg(&args, 2, "exercise id")?)?;
            session.replace_exercise(entry, exercise)?;
            println!("✓ Swapped entry {}", entry);
        }
        "status" => display_session(session, unit),
        "rest" => {
            let seconds: u64 = match args.get(1) {
                Some(_) => parse_arg(&args, 1, "seconds")?,
                None => u64::from(ctx.settings.rest_timer_seconds()),
            };
            let countdown = RestTimer::start(std::time::Duration::from_secs(seconds)).run(|left| {
                print!("\rRest {}:{:02} ", left / 60, left % 60);
                let _ = std::io::stdout().flush();
            });
            // Ctrl-C skips the rest instead of ending the session.
            tokio::select! {
                _ = countdown => println!("\n✓ Rest over"),
                Ok(()) = tokio::signal::ctrl_c() => println!("\nRest skipped"),
            }
        }
        "finish" => {
            match session.finish()?.wait().await? {
                FinishOutcome::Saved { workout_id } => {
                    println!("✓ Workout saved ({})", workout_id)
                }
                FinishOutcome::Discarded => println!("Nothing recorded; workout discarded"),
            }
            return Ok(Step::Done);
        }
        "discard" => {
            session.discard()?.wait().await?;
            println!("✓ Workout discarded");
            return Ok(Step::Done);
        }
        "quit" => return Ok(Step::Done),
        other => {
            return Err(Error::Session(format!("Unknown command: {}", other)));
        }
    }
    Ok(Step::Continue)
}

async fn cmd_session(ctx: &Context, origin: SessionOrigin) -> Result<()> {
    let workouts = WorkoutRepository::new(ctx.db.clone());
    let mut session = SessionManager::open(
        workouts,
        ctx.drafts.clone(),
        ctx.config.session.clone(),
        origin,
    )
    .await?;

    if session.phase() == SessionPhase::Paused {
        println!("Continuing a paused session; 'pause' resumes the clock.");
    }
    display_session(&session, ctx.unit());

    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match session_step(ctx, &mut session, line.trim()).await {
            Ok(Step::Continue) => {}
            Ok(Step::Done) => break,
            Err(e) => println!("error: {}", e),
        }
    }

    // Leaving without finishing keeps the draft for next time.
    if session.phase().is_active() {
        session.flush_draft().await?;
        println!(
            "Draft saved ({} sets recorded)",
            session.snapshot().recorded_sets()
        );
    }
    Ok(())
}

// ============================================================================
// Stats
// ============================================================================

fn cmd_stats(ctx: &Context, exercise: Option<i64>, metric: &str) -> Result<()> {
    let stats = StatsRepository::new(ctx.db.clone());
    let unit = ctx.unit();

    if let Some(id) = exercise {
        let exercise = require_exercise(ctx, id)?;
        let metric: ChartMetric = metric.parse()?;
        println!("{} ({:?})", exercise.title, metric);
        for point in stats.exercise_progress(id)? {
            let value = metric.value_of(&point);
            let shown = match metric {
                ChartMetric::MaxWeight | ChartMetric::TotalVolume => unit.format_weight(value),
                ChartMetric::MaxReps | ChartMetric::SetCount => format!("{}", value as u64),
            };
            println!("  {}  {}", local_time(point.start_time), shown);
        }
        return Ok(());
    }

    let today = Local::now().date_naive();
    let summary = stats.overview(today, &Local, ctx.settings.streak_rule())?;
    println!("This week:       {}", summary.workouts_this_week);
    println!("This month:      {}", summary.workouts_this_month);
    if let Some(avg) = summary.average_duration_seconds {
        println!("Avg duration:    {}", format_duration(avg.round() as u64));
    }
    println!(
        "Current streak:  {} {}",
        summary.current_streak,
        summary.streak_rule.unit()
    );
    println!("Total workouts:  {}", summary.total_workouts);
    println!("Total volume:    {}", unit.format_weight(summary.total_volume_kg));
    if let Some(longest) = summary.longest_workout_seconds {
        println!("Longest:         {}", format_duration(longest.max(0) as u64));
    }
    println!("Per week:        {:.1}", summary.avg_workouts_per_week);

    let days: Vec<String> = summary.calendar.keys().map(|d| d.to_string()).collect();
    if !days.is_empty() {
        println!("Days this month: {}", days.join(" "));
    }

    let breakdown = stats.category_breakdown()?;
    if !breakdown.is_empty() {
        println!("By category:");
        for row in breakdown {
            println!("  {:<20} {}", row.category_name, row.workout_count);
        }
    }
    Ok(())
}

fn cmd_records(ctx: &Context) -> Result<()> {
    let unit = ctx.unit();
    for record in StatsRepository::new(ctx.db.clone()).personal_records()? {
        println!(
            "{:<28} max {}  {} reps  best set {}",
            record.exercise_title,
            unit.format_weight(record.max_weight),
            record.max_reps,
            unit.format_weight(record.max_volume)
        );
    }
    Ok(())
}

fn cmd_history(ctx: &Context, exercise_id: i64) -> Result<()> {
    let exercise = require_exercise(ctx, exercise_id)?;
    let unit = ctx.unit();
    println!("{}", exercise.title);
    for entry in StatsRepository::new(ctx.db.clone()).exercise_set_history(exercise_id)? {
        println!(
            "  {}  #{}  {} x {}",
            local_time(entry.start_time),
            entry.set_number,
            unit.format_weight(entry.weight_kg),
            entry.reps
        );
    }
    Ok(())
}

// ============================================================================
// Export, import, settings
// ============================================================================

fn cmd_export(ctx: &Context, path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        ExportFormat::Json => {
            let data = export_json(&ctx.db, &mut writer)?;
            println!(
                "✓ Exported {} workouts to {}",
                data.workouts.len(),
                path.display()
            );
        }
        ExportFormat::Csv => {
            let rows = export_sets_csv(&ctx.db, &mut writer)?;
            println!("✓ Exported {} sets to {}", rows, path.display());
        }
    }
    writer.flush()?;
    Ok(())
}

fn cmd_import(ctx: &Context, path: &Path) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let summary = import_json(&ctx.db, reader)?;
    println!(
        "✓ Imported {} categories, {} exercises, {} workouts",
        summary.categories, summary.exercises, summary.workouts
    );
    if summary.skipped_exercises > 0 {
        println!(
            "  Skipped {} entries referencing unknown exercises",
            summary.skipped_exercises
        );
    }
    Ok(())
}

fn cmd_settings(ctx: &Context, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings = ctx.settings.all();
            println!("theme:          {}", settings.theme_mode);
            println!("dynamic-colors: {}", settings.dynamic_colors);
            println!("unit:           {}", settings.weight_unit);
            println!("rest-timer:     {}s", settings.rest_timer_seconds);
            println!("weekly-goal:    {}", settings.weekly_goal);
            let streak = match settings.streak_rule {
                StreakRule::Daily => "daily",
                StreakRule::WeeklyGoal(_) => "weekly",
            };
            println!("streak:         {}", streak);
        }
        SettingsAction::Set { key, value } => {
            ctx.settings.set_by_key(&key, &value)?;
            println!("✓ {} = {}", key, value);
        }
    }
    Ok(())
}
