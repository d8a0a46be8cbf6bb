use anyhow::{bail, Context, Result};
use instafram_client::{forms, ClientConfig, InstaFram, PostFilter, Route, SignInForm};
use instafram_common::{NewComment, Post};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "\
usage: instafram <command>

  feed [pages]                 show the general feed
  post <id>                    show a post with its comments
  search <query> [filter]      search posts (all, day, week, month, year)
  like <postId>                toggle like
  save <postId>                toggle save
  follow <userId>              toggle follow
  comment <postId> <text>      add a comment
  login <email> <password>     sign in
  logout                       sign out
  me                           show the signed-in user";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,instafram_client=debug".into());
    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_post(post: &Post) {
    println!(
        "{}  {} likes  {} comments  by {}",
        post.id,
        post.like_count(),
        post.comment_count(),
        post.creator.id()
    );
    if !post.content.is_empty() {
        println!("    {}", post.content);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    info!(base_url = %config.api.base_url, "Starting InstaFram client");

    let app = InstaFram::connect(&config)
        .await
        .context("Failed to initialize client")?;

    match (command.as_str(), &args[1..]) {
        ("feed", rest) => {
            let pages: usize = match rest.first() {
                Some(n) => n.parse().context("pages must be a number")?,
                None => 1,
            };
            app.load(&Route::Home).await.context("Failed to load feed")?;
            let feed = app.queries().feed();
            while feed.page_count() < pages && feed.has_next() {
                feed.fetch_next().await.context("Failed to load next page")?;
            }
            for post in feed.data() {
                print_post(&post);
            }
        }
        ("post", [id, ..]) => {
            let route = Route::PostDetail { id: id.clone() };
            app.load(&route).await.context("Failed to load post")?;
            let post = app.queries().post(id).load().await?;
            print_post(&post);
            for comment in app.queries().comments(id).data() {
                println!(
                    "  {}: {} ({} replies)",
                    comment.author.id(),
                    comment.content,
                    comment.reply_total()
                );
            }
        }
        ("search", [query, rest @ ..]) => {
            let filter: PostFilter = match rest.first() {
                Some(f) => f.parse()?,
                None => PostFilter::All,
            };
            let route = Route::Explore {
                search: Some(query.clone()),
                filter,
            };
            app.load(&route).await.context("Search failed")?;
            let results = app.queries().explore(Some(query.as_str()), filter).data();
            if results.is_empty() {
                println!("No posts match \"{}\"", query);
            }
            for post in results {
                print_post(&post);
            }
        }
        ("like", [id, ..]) => {
            app.mutations().toggle_like(id)?.await??;
            println!("Toggled like on {}", id);
        }
        ("save", [id, ..]) => {
            app.mutations().toggle_save(id)?.await??;
            println!("Toggled save on {}", id);
        }
        ("follow", [id, ..]) => {
            app.mutations().toggle_follow(id)?.await??;
            println!("Toggled follow on {}", id);
        }
        ("comment", [post_id, words @ ..]) if !words.is_empty() => {
            let draft = NewComment {
                post_id: post_id.clone(),
                content: words.join(" "),
                parent_id: None,
            };
            let comment = app.mutations().create_comment(draft)?.await??;
            println!("Commented {}", comment.id);
        }
        ("login", [email, password, ..]) => {
            let form = SignInForm {
                email: email.clone(),
                password: password.clone(),
            };
            if let Err(errors) = forms::validate_form(&form) {
                bail!("{}", errors.summary());
            }
            match app.login(&form).await {
                Ok(user) => println!("Signed in as {}", user.handle()),
                Err(e) => match forms::route_error(&e) {
                    Ok(fields) => bail!("{}", fields.summary()),
                    Err(notice) => bail!("{}", notice.message),
                },
            }
        }
        ("logout", _) => {
            app.logout().await.context("Failed to sign out")?;
            println!("Signed out");
        }
        ("me", _) => {
            let user = app.me().await.context("Failed to load profile")?;
            println!("{} ({})", user.name, user.handle());
            println!("{} followers, {} following", user.followers.len(), user.following.len());
        }
        _ => {
            println!("{}", USAGE);
        }
    }

    Ok(())
}
